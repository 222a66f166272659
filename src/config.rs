//! Configuration for the CryptoCam agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of each recorded segment
    #[serde(with = "duration_secs")]
    pub segment_duration: Duration,

    /// How long a connected peer may stay without reading the key
    #[serde(with = "duration_secs")]
    pub bonding_timeout: Duration,

    /// How long a peer may stay connected after reading the key
    #[serde(with = "duration_secs")]
    pub read_timeout: Duration,

    /// Delay before a closed segment file is handed to processing
    #[serde(with = "duration_millis", rename = "handoff_delay_ms")]
    pub handoff_delay: Duration,

    /// Directory holding raw recordings and processing artifacts
    pub work_dir: PathBuf,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    pub capture: CaptureConfig,

    pub tools: ToolConfig,

    pub store: StoreConfig,

    /// How local artifacts are erased
    pub erase: EraseMode,

    /// Unix socket served for the external peripheral daemon
    pub peripheral_socket: Option<PathBuf>,

    /// Name advertised by the peripheral
    pub device_name: String,

    pub service_uuid: String,

    pub key_characteristic_uuid: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptocam-agent");

        Self {
            segment_duration: Duration::from_secs(30),
            bonding_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            handoff_delay: Duration::from_millis(100),
            work_dir: data_dir.join("recordings"),
            data_path: data_dir,
            capture: CaptureConfig::default(),
            tools: ToolConfig::default(),
            store: StoreConfig::default(),
            erase: EraseMode::Shred,
            peripheral_socket: None,
            device_name: "CryptoCam".to_string(),
            service_uuid: "cc92cc92-ca19-0000-0000-000000000001".to_string(),
            key_characteristic_uuid: "cc92cc92-ca19-0000-0000-000000000002".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptocam-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject timings the rotation loop cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "segment_duration must be at least one second".to_string(),
            ));
        }
        if self.handoff_delay >= self.segment_duration {
            return Err(ConfigError::Invalid(
                "handoff_delay_ms must be shorter than the segment".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the persisted transparency statistics.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }
}

/// Camera settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    /// Program used for the raspivid backend
    pub program: String,
    pub fps: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::Raspivid,
            program: "raspivid".to_string(),
            fps: 30,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    Raspivid,
    None,
}

/// External media tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub mp4box: String,
    pub ffmpeg: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            mp4box: "MP4Box".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Remote object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub bucket: String,
    /// AWS CLI profile
    pub profile: Option<String>,
    pub region: Option<String>,
    /// S3-compatible endpoint (R2, MinIO, ...)
    pub endpoint_url: Option<String>,
    /// Public URL prefix under which uploaded objects can be fetched
    pub base_url: String,
    /// Target directory for the directory backend
    pub directory: Option<PathBuf>,
    pub acl: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            bucket: "cryptocam".to_string(),
            profile: Some("CryptoCam".to_string()),
            region: Some("eu-west-1".to_string()),
            endpoint_url: None,
            base_url: "https://s3-eu-west-1.amazonaws.com/cryptocam/".to_string(),
            directory: None,
            acl: Some("public-read".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Directory,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraseMode {
    Shred,
    Unlink,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for whole-second durations.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
