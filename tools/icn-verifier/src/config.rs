use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use icn_federation_trust::cache::DEFAULT_CACHE_CAPACITY;

use crate::VerifierError;

/// Verifier configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Memoisation configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Where to find federation manifests
    #[serde(default)]
    pub manifests: ManifestConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Pretty-print JSON output
    #[serde(default = "default_true")]
    pub pretty: bool,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries kept per operation
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

/// Manifest lookup configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Directory of manifest JSON files used to resolve credentials by federation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// How results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            pretty: default_true(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl VerifierConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VerifierError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| VerifierError::read(path, e))?;
        toml::from_str(&content)
            .map_err(|e| VerifierError::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, VerifierError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| VerifierError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(VerifierError::read(path, e)),
        }
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), VerifierError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| VerifierError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VerifierError::read(parent, e))?;
        }
        fs::write(path, content).map_err(|e| VerifierError::read(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: VerifierConfig = toml::from_str(
            r#"
            [output]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.manifests.directory.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("verifier.toml");
        assert_eq!(VerifierConfig::load_or_default(&path).unwrap(), VerifierConfig::default());
        assert!(matches!(VerifierConfig::load(&path), Err(VerifierError::ReadError { .. })));

        let mut config = VerifierConfig::default();
        config.logging.level = "icn_federation_trust=debug".to_string();
        config.cache.capacity = 16;
        config.manifests.directory = Some(PathBuf::from("/etc/icn/manifests"));
        config.save(&path).unwrap();

        assert_eq!(VerifierConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
