use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::classify::{Classifier, Rule};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse emitter config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pattern for tag '{tag}': {source}")]
    InvalidPattern {
        tag: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate path tag: {tag}")]
    DuplicateTag { tag: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    prefix: String,
    unknown_path_target: String,
    #[serde(default)]
    path_translations: Vec<RawTranslation>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTranslation {
    tag: String,
    pattern: String,
}

/// How decoded log lines become timing metrics.
#[derive(Clone, Debug)]
pub struct EmitterConfig {
    /// Prepended to every metric name.
    pub prefix: String,
    pub classifier: Classifier,
}

impl EmitterConfig {
    pub fn new(prefix: impl Into<String>, classifier: Classifier) -> Self {
        Self {
            prefix: prefix.into(),
            classifier,
        }
    }

    /// Parses a TOML emitter config. `[[path_translations]]` entries are
    /// evaluated in the order they appear.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(input)?;

        let mut rules: Vec<Rule> = Vec::with_capacity(raw.path_translations.len());
        for RawTranslation { tag, pattern } in raw.path_translations {
            if rules.iter().any(|r| r.tag == tag) {
                return Err(ConfigError::DuplicateTag { tag });
            }
            let rule = Rule::new(tag.as_str(), &pattern)
                .map_err(|source| ConfigError::InvalidPattern { tag, source })?;
            rules.push(rule);
        }

        Ok(Self::new(
            raw.prefix,
            Classifier::new(rules, raw.unknown_path_target),
        ))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}

#[test]
fn test_from_toml_str() {
    let config = EmitterConfig::from_toml_str(
        r#"
        prefix = "fxa.content."
        unknown_path_target = "other"

        [[path_translations]]
        tag = "settings"
        pattern = "^/settings"

        [[path_translations]]
        tag = "auth"
        pattern = "^/auth"
        "#,
    )
    .unwrap();

    assert_eq!(config.prefix, "fxa.content.");
    let tags: Vec<_> = config.classifier.rules().iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, ["settings", "auth"]);
    assert_eq!(config.classifier.classify(Some("/auth/x")), "auth");
    assert_eq!(config.classifier.classify(Some("/")), "other");
}

#[test]
fn test_config_errors() {
    let err = EmitterConfig::from_toml_str(
        r#"
        unknown_path_target = "other"
        [[path_translations]]
        tag = "broken"
        pattern = "^/(settings"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { ref tag, .. } if tag == "broken"));

    let err = EmitterConfig::from_toml_str(
        r#"
        unknown_path_target = "other"
        [[path_translations]]
        tag = "a"
        pattern = "^/a"
        [[path_translations]]
        tag = "a"
        pattern = "^/b"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateTag { ref tag } if tag == "a"));

    let err = EmitterConfig::from_toml_str("prefix = 1").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = EmitterConfig::load("/nonexistent/emitter.toml").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}
