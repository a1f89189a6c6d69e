//! Operator project settings and the `operate.yml` loader.
//!
//! Every key in the settings file is optional. The file is read into a raw,
//! all-optional mirror of [`OperatorSettings`] which is then merged onto the
//! defaults, so a missing key is an empty value rather than a parse error.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::{OperateError, Result};

/// Settings file looked up when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "operate.yml";

/// Settings of one operator project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorSettings {
    /// Image reference, without tag
    pub image: Option<String>,
    /// Operator version, also the default image tag
    pub version: Option<String>,
    /// OLM release channels
    pub channels: Vec<String>,
    /// Kinds to create APIs for, in creation order
    pub kinds: Vec<String>,
    /// Sample custom resource deployed by default
    pub default_sample: Option<String>,
    pub domain: Option<String>,
    /// API group
    pub group: Option<String>,
    pub api_version: Option<String>,
    initialized: bool,
}

/// `operate.yml` exactly as written.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSettings {
    #[serde(default, deserialize_with = "scalar")]
    image: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    version: Option<String>,
    channels: Option<Vec<String>>,
    kinds: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar")]
    default_sample: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    domain: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    group: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    api_version: Option<String>,
}

/// Any YAML scalar as text, so `version: 1.0` reads as "1.0".
fn scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}

impl From<RawSettings> for OperatorSettings {
    fn from(raw: RawSettings) -> Self {
        Self {
            image: raw.image,
            version: raw.version,
            channels: raw.channels.unwrap_or_default(),
            kinds: raw.kinds.unwrap_or_default(),
            default_sample: raw.default_sample,
            domain: raw.domain,
            group: raw.group,
            api_version: raw.api_version,
            ..Self::default()
        }
    }
}

impl OperatorSettings {
    /// Load settings from a YAML file.
    ///
    /// Unknown keys are ignored and an empty document yields all defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| OperateError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|err| match err {
            OperateError::SettingsParse { source, .. } => OperateError::SettingsParse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse settings from YAML text.
    pub fn parse(content: &str) -> Result<Self> {
        let parse_error = |source| OperateError::SettingsParse {
            path: DEFAULT_SETTINGS_FILE.into(),
            source,
        };

        let document: serde_yaml::Value = serde_yaml::from_str(content).map_err(parse_error)?;
        debug!("Recovered settings:");
        debug!("{:?}", document);

        let raw = if document.is_null() {
            RawSettings::default()
        } else {
            serde_yaml::from_value::<RawSettings>(document).map_err(parse_error)?
        };

        let settings = Self::from(raw);
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that hold regardless of which keys are present.
    pub fn validate(&self) -> Result<()> {
        if let Some(index) = self.kinds.iter().position(|kind| kind.trim().is_empty()) {
            return Err(OperateError::config(format!(
                "kinds[{}] must be a non-empty Kind name",
                index
            )));
        }
        Ok(())
    }

    /// Whether the project has been scaffolded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Record successful scaffolding. There is no way back.
    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    /// `name` of a required setting, or a configuration error.
    pub(crate) fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| OperateError::config(format!("'{}' is not set in the settings", name)))
    }
}

struct Unset<'a>(&'a Option<String>);

impl fmt::Display for Unset<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => f.write_str(value),
            None => f.write_str("None"),
        }
    }
}

impl fmt::Display for OperatorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OperatorSettings(image={}, version={}, channels={:?}, kinds={:?}, \
             default_sample={}, domain={}, group={}, api_version={}, initialized={})",
            Unset(&self.image),
            Unset(&self.version),
            self.channels,
            self.kinds,
            Unset(&self.default_sample),
            Unset(&self.domain),
            Unset(&self.group),
            Unset(&self.api_version),
            self.initialized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
image: quay.io/example/memcached-operator
version: 0.0.1
channels:
  - alpha
  - stable
kinds:
  - Memcached
  - MemcachedBackup
default-sample: memcached_v1alpha1_memcached.yaml
domain: example.com
group: cache
api-version: v1alpha1
"#;

    #[test]
    fn test_load_full_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        fs::write(&path, FULL).unwrap();

        let settings = OperatorSettings::load(&path).unwrap();
        assert_eq!(settings.image.as_deref(), Some("quay.io/example/memcached-operator"));
        assert_eq!(settings.version.as_deref(), Some("0.0.1"));
        assert_eq!(settings.channels, vec!["alpha", "stable"]);
        assert_eq!(settings.kinds, vec!["Memcached", "MemcachedBackup"]);
        assert_eq!(
            settings.default_sample.as_deref(),
            Some("memcached_v1alpha1_memcached.yaml")
        );
        assert_eq!(settings.domain.as_deref(), Some("example.com"));
        assert_eq!(settings.group.as_deref(), Some("cache"));
        assert_eq!(settings.api_version.as_deref(), Some("v1alpha1"));
        assert!(!settings.is_initialized());
    }

    #[test]
    fn test_only_image_leaves_rest_empty() {
        let settings = OperatorSettings::parse("image: foo\n").unwrap();
        assert_eq!(
            settings,
            OperatorSettings {
                image: Some("foo".to_string()),
                ..OperatorSettings::default()
            }
        );
    }

    #[test]
    fn test_numeric_versions_are_read_as_text() {
        let settings = OperatorSettings::parse("image: foo\nversion: 1.0\n").unwrap();
        assert_eq!(settings.version.as_deref(), Some("1.0"));

        let settings = OperatorSettings::parse("image: foo\nversion: 2\n").unwrap();
        assert_eq!(settings.version.as_deref(), Some("2"));

        let settings = OperatorSettings::parse("api-version: 1\ndomain: true\n").unwrap();
        assert_eq!(settings.api_version.as_deref(), Some("1"));
        assert_eq!(settings.domain.as_deref(), Some("true"));
    }

    #[test]
    fn test_nested_value_for_scalar_key_fails() {
        let err = OperatorSettings::parse("version:\n  major: 1\n").unwrap_err();
        assert!(matches!(err, OperateError::SettingsParse { .. }));
    }

    #[test]
    fn test_empty_document_is_all_defaults() {
        assert_eq!(OperatorSettings::parse("").unwrap(), OperatorSettings::default());
        assert_eq!(OperatorSettings::parse("# nothing\n").unwrap(), OperatorSettings::default());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let settings = OperatorSettings::parse("image: foo\nreplicas: 3\n").unwrap();
        assert_eq!(settings.image.as_deref(), Some("foo"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = OperatorSettings::load(dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, OperateError::SettingsRead { .. }));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "image: [unclosed\n").unwrap();

        match OperatorSettings::load(&path).unwrap_err() {
            OperateError::SettingsParse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected SettingsParse, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_value_type_fails() {
        let err = OperatorSettings::parse("kinds: Memcached\n").unwrap_err();
        assert!(matches!(err, OperateError::SettingsParse { .. }));

        let err = OperatorSettings::parse("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, OperateError::SettingsParse { .. }));
    }

    #[test]
    fn test_empty_kind_is_rejected() {
        let err = OperatorSettings::parse("kinds:\n  - Memcached\n  - ''\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: kinds[1] must be a non-empty Kind name"
        );
    }

    #[test]
    fn test_initialized_only_moves_forward() {
        let mut settings = OperatorSettings::default();
        assert!(!settings.is_initialized());
        settings.mark_initialized();
        settings.mark_initialized();
        assert!(settings.is_initialized());
    }

    #[test]
    fn test_display_lists_every_field() {
        let settings = OperatorSettings {
            image: Some("foo".to_string()),
            kinds: vec!["Memcached".to_string()],
            ..OperatorSettings::default()
        };
        assert_eq!(
            settings.to_string(),
            "OperatorSettings(image=foo, version=None, channels=[], kinds=[\"Memcached\"], \
             default_sample=None, domain=None, group=None, api_version=None, initialized=false)"
        );
    }
}
