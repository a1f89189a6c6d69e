//! operator-sdk installation
//!
//! [`SdkInstaller`] is the contract the operator workflow depends on: make
//! sure a given version of `operator-sdk` is installed and report which
//! version that turned out to be. [`ReleaseInstaller`] fulfils it from the
//! upstream GitHub releases with `curl`:
//!
//! 1. `latest` is resolved by following the `releases/latest` redirect
//! 2. the release asset is staged in `<dir>` and checked against the
//!    release's `checksums.txt`
//! 3. only a verified asset becomes `<dir>/operator-sdk-v<version>`
//! 4. the target path is re-pointed at it with a symlink

use std::fs;
use std::io;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{OperateError, Result};
use crate::runner::{FailurePolicy, Runner, quote};

/// Upstream release download prefix; the tag follows directly.
pub const RELEASE_URL: &str = "https://github.com/operator-framework/operator-sdk/releases/download/v";

/// Redirects to the newest release tag.
pub const LATEST_URL: &str = "https://github.com/operator-framework/operator-sdk/releases/latest";

/// SHA-256 list published with every release.
pub const CHECKSUMS_FILE: &str = "checksums.txt";

/// Version requested when none is given.
pub const LATEST: &str = "latest";

/// Ensures an operator-sdk binary is installed.
pub trait SdkInstaller {
    /// Install `version` (or `latest`) into `directory`, link it at `target`,
    /// and return the concrete version installed.
    fn ensure_installed(&self, directory: &Path, target: &Path, version: &str) -> Result<String>;
}

/// Where operator-sdk lives: `$HOME/.local/bin/operator-sdk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkPaths {
    pub directory: PathBuf,
    pub target: PathBuf,
}

impl SdkPaths {
    pub fn under(home: impl AsRef<Path>) -> Self {
        let directory = home.as_ref().join(".local").join("bin");
        let target = directory.join("operator-sdk");
        Self { directory, target }
    }

    /// Paths under the current user's `$HOME`.
    pub fn from_home() -> Result<Self> {
        let home = std::env::var_os("HOME").ok_or(OperateError::MissingHome)?;
        Ok(Self::under(home))
    }
}

/// Downloads operator-sdk release binaries with `curl`.
#[derive(Debug)]
pub struct ReleaseInstaller<R> {
    runner: R,
    os: &'static str,
    arch: &'static str,
}

impl<R: Runner> ReleaseInstaller<R> {
    /// Installer for the host platform.
    pub fn new(runner: R) -> Self {
        Self::for_platform(runner, std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn for_platform(runner: R, os: &'static str, arch: &'static str) -> Self {
        Self { runner, os, arch }
    }

    /// Tag of the newest upstream release, without the leading `v`.
    fn latest_version(&self) -> Result<String> {
        let command = format!("curl -sSfL -o /dev/null -w %{{url_effective}} {}", LATEST_URL);
        let lines = self.runner.run_all(&command, FailurePolicy::Fail)?;
        let url = lines
            .iter()
            .rev()
            .find(|line| !line.is_empty())
            .ok_or_else(|| OperateError::install("no redirect from the latest release page"))?;
        version_from_release_url(url)
    }

    fn download(&self, version: &str, dest: &Path) -> Result<()> {
        let url = release_asset_url(version, self.os, self.arch);
        info!("Downloading operator-sdk {} from {}", version, url);
        let dest = dest
            .to_str()
            .ok_or_else(|| OperateError::install(format!("non UTF-8 install path {:?}", dest)))?;
        let command = format!("curl -sSfL -o {} {}", quote(dest)?, quote(&url)?);
        self.runner.run_all(&command, FailurePolicy::Fail)?;
        Ok(())
    }

    /// SHA-256 the release publishes for this platform's asset.
    fn published_digest(&self, version: &str) -> Result<String> {
        let url = format!("{}{}/{}", RELEASE_URL, version, CHECKSUMS_FILE);
        let lines = self
            .runner
            .run_all(&format!("curl -sSfL {}", quote(&url)?), FailurePolicy::Fail)?;
        let asset = release_asset_name(self.os, self.arch);
        digest_for(&lines, &asset).ok_or_else(|| {
            OperateError::install(format!("{} of v{} has no entry for {}", CHECKSUMS_FILE, version, asset))
        })
    }

    /// Download into a staging file next to `binary` and move it into place
    /// once its digest matches. A failed or interrupted download leaves nothing.
    fn install_release(&self, version: &str, directory: &Path, binary: &Path) -> Result<()> {
        let staged = NamedTempFile::new_in(directory)?;
        self.download(version, staged.path())?;

        let expected = self.published_digest(version)?;
        let actual = sha256_file(staged.path())?;
        if actual != expected {
            return Err(OperateError::install(format!(
                "checksum mismatch for operator-sdk {}: expected {}, got {}",
                version, expected, actual
            )));
        }
        debug!("sha256 {} verified", actual);

        staged.persist(binary).map_err(|err| err.error)?;
        Ok(())
    }
}

impl<R: Runner> SdkInstaller for ReleaseInstaller<R> {
    fn ensure_installed(&self, directory: &Path, target: &Path, version: &str) -> Result<String> {
        let version = if version == LATEST {
            self.latest_version()?
        } else {
            version.trim_start_matches('v').to_string()
        };

        fs::create_dir_all(directory)?;
        let binary = directory.join(format!("operator-sdk-v{}", version));
        if binary.exists() {
            debug!("operator-sdk {} already present at {:?}", version, binary);
        } else {
            self.install_release(&version, directory, &binary)?;
        }

        let mut permissions = fs::metadata(&binary)?.permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&binary, permissions)?;

        if target.symlink_metadata().is_ok() {
            fs::remove_file(target)?;
        }
        symlink(&binary, target)?;
        debug!("Linked {:?} -> {:?}", target, binary);

        Ok(version)
    }
}

/// Release asset for one platform, e.g. `.../v1.33.0/operator-sdk_linux_amd64`.
pub fn release_asset_url(version: &str, os: &str, arch: &str) -> String {
    format!("{}{}/{}", RELEASE_URL, version, release_asset_name(os, arch))
}

fn release_asset_name(os: &str, arch: &str) -> String {
    format!("operator-sdk_{}_{}", os, release_arch(arch))
}

/// Digest of `asset` in `sha256sum` output (`<hex>  <name>`, or `*<name>`).
fn digest_for(lines: &[String], asset: &str) -> Option<String> {
    lines.iter().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == asset).then(|| digest.to_ascii_lowercase())
    })
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Map Rust's architecture names onto the ones used by release assets.
fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

/// `.../releases/tag/v1.33.0` -> `1.33.0`
fn version_from_release_url(url: &str) -> Result<String> {
    let tag = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let version = tag.trim_start_matches('v');
    if version.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(OperateError::install(format!(
            "cannot read a release version from {:?}",
            url
        )));
    }
    Ok(version.to_string())
}
