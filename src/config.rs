use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root holding the raw `song_data` and `log_data` trees.
    #[serde(default = "default_input")]
    pub input: String,

    /// Root the five table directories are written under.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_song_prefix")]
    pub song_prefix: String,

    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_input() -> String {
    "s3://udacity-dend".to_string()
}

fn default_output() -> String {
    "./output".to_string()
}

fn default_song_prefix() -> String {
    "song_data".to_string()
}

fn default_log_prefix() -> String {
    "log_data".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string()]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            song_prefix: default_song_prefix(),
            log_prefix: default_log_prefix(),
            extensions: default_extensions(),
        }
    }
}

/// Credentials and endpoint for S3 locations. Unset keys fall back to the
/// standard `AWS_*` environment variables.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (MinIO, localstack).
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub allow_http: bool,
}

impl fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Remove whatever already sits under a table's prefix before writing.
    #[default]
    Overwrite,
    /// Refuse to write a table whose prefix already holds objects.
    ErrorIfExists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max difference in seconds between an event's `length` and a song's
    /// `duration` for the two to be considered the same recording.
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance: f64,

    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    #[serde(default)]
    pub write_mode: WriteMode,
}

fn default_duration_tolerance() -> f64 {
    0.01
}

fn default_fetch_concurrency() -> usize {
    16
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duration_tolerance: default_duration_tolerance(),
            fetch_concurrency: default_fetch_concurrency(),
            write_mode: WriteMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub compression: CompressionCodec,

    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,
}

fn default_max_rows_per_file() -> usize {
    1_000_000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::default(),
            max_rows_per_file: default_max_rows_per_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Stderr,
    File,
    Journald,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub target: LogTarget,

    /// Directory for the rolling log file when `target = "file"`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("songplay-etl")
                .join("logs")
        })
    }
}

impl Config {
    /// Load from `$SONGPLAY_CONFIG` or the default location. A missing file
    /// yields the defaults.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let tolerance = self.pipeline.duration_tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            anyhow::bail!(
                "pipeline.duration_tolerance must be a non-negative number, got {}",
                self.pipeline.duration_tolerance
            );
        }
        if self.pipeline.fetch_concurrency == 0 {
            anyhow::bail!("pipeline.fetch_concurrency must be at least 1");
        }
        if self.output.max_rows_per_file == 0 {
            anyhow::bail!("output.max_rows_per_file must be at least 1");
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SONGPLAY_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("songplay-etl")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.storage.song_prefix, "song_data");
        assert_eq!(config.storage.log_prefix, "log_data");
        assert_eq!(config.storage.extensions, vec!["json".to_string()]);
        assert_eq!(config.pipeline.write_mode, WriteMode::Overwrite);
        assert_eq!(config.output.compression, CompressionCodec::Snappy);
        assert_eq!(config.logging.target, LogTarget::Stderr);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [storage]
            input = "s3://raw-bucket/sparkify"
            output = "file:///tmp/lake"

            [aws]
            access_key_id = "AKIA"
            secret_access_key = "shh"
            region = "us-west-2"

            [pipeline]
            duration_tolerance = 0.5
            write_mode = "error_if_exists"

            [output]
            compression = "zstd"
            max_rows_per_file = 10

            [logging]
            target = "journald"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.input, "s3://raw-bucket/sparkify");
        assert_eq!(config.aws.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.pipeline.duration_tolerance, 0.5);
        assert_eq!(config.pipeline.fetch_concurrency, 16);
        assert_eq!(config.pipeline.write_mode, WriteMode::ErrorIfExists);
        assert_eq!(config.output.compression, CompressionCodec::Zstd);
        assert_eq!(config.output.max_rows_per_file, 10);
        assert_eq!(config.logging.target, LogTarget::Journald);
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let aws = AwsConfig {
            access_key_id: Some("AKIA".to_string()),
            secret_access_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", aws);
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml("[pipeline]\nduration_tolerance = -1.0").is_err());
        assert!(Config::from_toml("[pipeline]\nfetch_concurrency = 0").is_err());
        assert!(Config::from_toml("[output]\nmax_rows_per_file = 0").is_err());
    }
}
