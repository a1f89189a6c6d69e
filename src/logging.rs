//! Process-wide logger provisioning
//!
//! The logger is created lazily on the first call to [`get_logger`] and is
//! shared by everything that runs afterwards. It has two sinks:
//!
//! - a console sink on stderr whose threshold follows the CLI verbosity
//! - a system log sink on `/dev/log`, fixed at INFO, installed only when the
//!   socket exists on the host
//!
//! The logger itself filters nothing; the per-sink thresholds are the only
//! effective filters. Repeated calls never install a second pair of sinks,
//! they only move the console threshold.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, reload};

/// Name every log line is tagged with.
pub const LOGGER_NAME: &str = "Operator";

/// Conventional system log socket.
pub const SYSLOG_SOCKET: &str = "/dev/log";

/// syslog facility `user`
const LOG_USER: u8 = 1;

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Log severities on the conventional numeric scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Debug = 10,
    Info = 20,
    Warning = 30,
    Error = 40,
}

impl Severity {
    /// Numeric value (10, 20, 30, 40).
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Map a numeric threshold back to the severity it admits.
    pub fn from_value(value: u8) -> Self {
        match value {
            0..=10 => Self::Debug,
            11..=20 => Self::Info,
            21..=30 => Self::Warning,
            _ => Self::Error,
        }
    }

    /// Name as printed in log lines.
    pub fn name(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Filter admitting this severity and everything above it.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
        }
    }

    /// RFC 3164 severity code
    fn syslog_code(self) -> u8 {
        match self {
            Self::Debug => 7,
            Self::Info => 6,
            Self::Warning => 4,
            Self::Error => 3,
        }
    }
}

impl From<&Level> for Severity {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warning,
            Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Console threshold for a verbosity count.
///
/// `40 - min(3, v) * 10`, so 0 is ERROR and 3 or more is DEBUG. Without a
/// verbosity only errors reach the console.
pub fn console_threshold(verbosity: Option<u8>) -> Severity {
    match verbosity {
        Some(v) => Severity::from_value(40 - v.min(3) * 10),
        None => Severity::Error,
    }
}

/// Handle to the process-wide logger.
pub struct Logger {
    console: reload::Handle<LevelFilter, Registry>,
    console_threshold: AtomicU8,
    syslog: bool,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &LOGGER_NAME)
            .field("console_threshold", &self.console_threshold())
            .field("syslog", &self.syslog)
            .finish()
    }
}

/// Get the process-wide logger, creating its sinks on first use.
///
/// Every call returns the same logger. When the sinks already exist, a
/// `Some(verbosity)` only adjusts the console threshold; the system log
/// threshold never changes.
pub fn get_logger(verbosity: Option<u8>) -> &'static Logger {
    let mut created = false;
    let logger = LOGGER.get_or_init(|| {
        created = true;
        Logger::install(verbosity)
    });

    if !created {
        if let Some(verbosity) = verbosity {
            logger.set_verbosity(verbosity);
        }
    }

    logger
}

impl Logger {
    fn install(verbosity: Option<u8>) -> Self {
        let threshold = console_threshold(verbosity);
        let (filter, console) = reload::Layer::new(threshold.level_filter());

        let console_layer = tracing_subscriber::fmt::layer()
            .event_format(OperatorFormat)
            .with_ansi(false)
            .with_writer(io::stderr)
            .with_filter(filter);

        let syslog = SyslogWriter::connect(SYSLOG_SOCKET);
        let has_syslog = syslog.is_some();
        let syslog_layer = syslog.map(|writer| {
            tracing_subscriber::fmt::layer()
                .event_format(OperatorFormat)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(Severity::Info.level_filter())
        });

        let installed = Registry::default()
            .with(console_layer)
            .with(syslog_layer)
            .try_init();

        if let Err(e) = installed {
            // Another subscriber owns the process; keep tracking thresholds anyway.
            eprintln!("{LOGGER_NAME}: logger sinks not installed: {e}");
        }

        Self {
            console,
            console_threshold: AtomicU8::new(threshold.value()),
            syslog: has_syslog,
        }
    }

    /// Logger name
    pub fn name(&self) -> &'static str {
        LOGGER_NAME
    }

    /// Current console sink threshold.
    pub fn console_threshold(&self) -> Severity {
        Severity::from_value(self.console_threshold.load(Ordering::Relaxed))
    }

    /// Whether the system log sink is installed.
    pub fn has_syslog(&self) -> bool {
        self.syslog
    }

    /// Number of installed sinks (console plus optional system log).
    pub fn sink_count(&self) -> usize {
        1 + usize::from(self.syslog)
    }

    /// Move the console threshold to match `verbosity`.
    pub fn set_verbosity(&self, verbosity: u8) {
        let threshold = console_threshold(Some(verbosity));
        if let Err(e) = self.console.modify(|filter| *filter = threshold.level_filter()) {
            tracing::debug!("Console threshold not reloaded: {}", e);
        }
        self.console_threshold.store(threshold.value(), Ordering::Relaxed);
    }
}

/// `<timestamp> Operator [ LEVEL ]: message`
pub struct OperatorFormat;

impl<S, N> FormatEvent<S, N> for OperatorFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        SystemTime.format_time(&mut writer)?;
        let severity = Severity::from(event.metadata().level());
        write!(writer, " {} [{:^9}]: ", LOGGER_NAME, severity.name())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Datagram connection to the system log socket.
#[derive(Clone)]
struct SyslogWriter {
    socket: Arc<UnixDatagram>,
}

impl SyslogWriter {
    fn connect(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return None;
        }
        let socket = UnixDatagram::unbound().ok()?;
        socket.connect(path).ok()?;
        Some(Self {
            socket: Arc::new(socket),
        })
    }

    fn record(&self, severity: Severity) -> SyslogRecord {
        SyslogRecord {
            socket: Arc::clone(&self.socket),
            priority: (LOG_USER << 3) | severity.syslog_code(),
            buf: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogRecord;

    fn make_writer(&'a self) -> Self::Writer {
        self.record(Severity::Info)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.record(Severity::from(meta.level()))
    }
}

/// One formatted event; sent as a single datagram when dropped.
struct SyslogRecord {
    socket: Arc<UnixDatagram>,
    priority: u8,
    buf: Vec<u8>,
}

impl io::Write for SyslogRecord {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogRecord {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        // Nowhere left to report a failed send.
        let _ = self.socket.send(&frame(self.priority, &self.buf));
    }
}

/// `<PRI>message\0`
fn frame(priority: u8, message: &[u8]) -> Vec<u8> {
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let mut framed = format!("<{priority}>").into_bytes();
    framed.extend_from_slice(body);
    framed.push(0);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[test]
    fn test_console_threshold_table() {
        assert_eq!(console_threshold(Some(0)), Severity::Error);
        assert_eq!(console_threshold(Some(1)), Severity::Warning);
        assert_eq!(console_threshold(Some(2)), Severity::Info);
        assert_eq!(console_threshold(Some(3)), Severity::Debug);
        assert_eq!(console_threshold(Some(100)), Severity::Debug);
        assert_eq!(console_threshold(None), Severity::Error);
    }

    #[test]
    fn test_severity_values() {
        assert_eq!(Severity::Debug.value(), 10);
        assert_eq!(Severity::Error.value(), 40);
        assert_eq!(Severity::from_value(30), Severity::Warning);
        assert_eq!(Severity::from(&Level::TRACE), Severity::Debug);
        assert_eq!(Severity::from(&Level::WARN), Severity::Warning);
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if let Ok(mut buf) = self.0.lock() {
                buf.extend_from_slice(data);
            }
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_format_centers_level_name() {
        let buffer = Buffer::default();
        let sink = buffer.clone();
        let subscriber = Registry::default().with(
            tracing_subscriber::fmt::layer()
                .event_format(OperatorFormat)
                .with_ansi(false)
                .with_writer(move || sink.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello");
            tracing::warn!("careful");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" Operator [  INFO   ]: hello"), "{}", lines[0]);
        assert!(lines[1].ends_with(" Operator [ WARNING ]: careful"), "{}", lines[1]);
    }

    #[test]
    fn test_frame_strips_newline_and_terminates() {
        assert_eq!(frame(14, b"msg\n"), b"<14>msg\0".to_vec());
        assert_eq!(frame(11, b"no newline"), b"<11>no newline\0".to_vec());
    }

    #[test]
    fn test_syslog_record_sends_one_datagram_with_priority() {
        let (tx, rx) = UnixDatagram::pair().unwrap();
        let writer = SyslogWriter {
            socket: Arc::new(tx),
        };

        {
            let mut record = writer.record(Severity::Warning);
            record.write_all(b"first half ").unwrap();
            record.write_all(b"second half\n").unwrap();
        }

        let mut buf = [0u8; 128];
        let n = rx.recv(&mut buf).unwrap();
        // facility user (1) << 3 | warning (4)
        assert_eq!(&buf[..n], b"<12>first half second half\0");
    }

    #[test]
    fn test_missing_socket_installs_no_syslog_sink() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SyslogWriter::connect(dir.path().join("log")).is_none());
    }
}
