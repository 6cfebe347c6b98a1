//! Configuration types for hashdl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// NNTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,

    /// Server port (typically 119 for unencrypted, 563 for TLS)
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    #[serde(default)]
    pub tls: bool,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Number of connections to open — the size of the worker pool
    #[serde(default = "default_connections")]
    pub connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 119,
            tls: false,
            username: None,
            password: None,
            connections: default_connections(),
        }
    }
}

// Conversion from our ServerConfig to nntp-rs's ServerConfig
impl From<ServerConfig> for nntp_rs::ServerConfig {
    fn from(config: ServerConfig) -> Self {
        nntp_rs::ServerConfig {
            host: config.host,
            port: config.port,
            tls: config.tls,
            allow_insecure_tls: false,
            username: config.username.unwrap_or_default(),
            password: config.password.unwrap_or_default(),
        }
    }
}

/// Repair (par2) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Run the external repair tool when parts are missing (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ask the repair tool to purge recovery files after a successful
    /// repair (default: true)
    #[serde(default = "default_true")]
    pub delete_recovery_files: bool,

    /// Path to the par2 executable (searched in PATH if None)
    #[serde(default)]
    pub par2_path: Option<PathBuf>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delete_recovery_files: true,
            par2_path: None,
        }
    }
}

/// Extraction (unrar) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Run the external extraction tool after download/repair (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delete archive volumes after successful extraction (default: true)
    #[serde(default = "default_true")]
    pub delete_archives: bool,

    /// Path to the unrar executable (searched in PATH if None)
    #[serde(default)]
    pub unrar_path: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delete_archives: true,
            unrar_path: None,
        }
    }
}

/// Main configuration for a download job
///
/// Everything needed to reconstruct one payload: the shared header string,
/// the server to pull from, retry ceilings, the two external tools and the
/// working/destination directories.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// NNTP server to fetch from
    pub server: ServerConfig,

    /// Shared header string (base64 `title:dataParts:par2Parts`).
    /// Hashed as-is for article addressing.
    pub header: String,

    /// Password handed to the extraction tool for encrypted archives
    #[serde(default)]
    pub password: Option<String>,

    /// Connect retries per connection slot before the slot is abandoned
    /// (default: 3)
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Fixed wait between connect attempts (default: 5 seconds)
    #[serde(default = "default_connect_wait", with = "duration_serde")]
    pub connect_wait: Duration,

    /// Fetch retries per article before it is declared missing (default: 3)
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Repair settings
    #[serde(default)]
    pub repair: RepairConfig,

    /// Extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Temporary directory files are assembled in (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Final destination directory (default: "./downloads")
    #[serde(default = "default_dest_dir")]
    pub dest_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            header: String::new(),
            password: None,
            connect_retries: default_connect_retries(),
            connect_wait: default_connect_wait(),
            fetch_retries: default_fetch_retries(),
            repair: RepairConfig::default(),
            extraction: ExtractionConfig::default(),
            temp_dir: default_temp_dir(),
            dest_dir: default_dest_dir(),
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key when the header,
    /// server host or pool size is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.header.is_empty() {
            return Err(Error::Config {
                message: "header must not be empty".into(),
                key: Some("header".into()),
            });
        }
        if self.server.host.is_empty() {
            return Err(Error::Config {
                message: "server host must not be empty".into(),
                key: Some("server.host".into()),
            });
        }
        if self.server.connections == 0 {
            return Err(Error::Config {
                message: "at least one connection is required".into(),
                key: Some("server.connections".into()),
            });
        }
        Ok(())
    }
}

fn default_connections() -> usize {
    50
}

fn default_connect_retries() -> u32 {
    3
}

fn default_connect_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_dest_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                host: "news.example.com".into(),
                port: 563,
                tls: true,
                username: Some("user".into()),
                password: Some("pass".into()),
                connections: 20,
            },
            header: "dGVzdDo1OjI=".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_mirror_shipped_configuration() {
        let config = Config::default();
        assert_eq!(config.server.connections, 50);
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.connect_wait, Duration::from_secs(5));
        assert_eq!(config.fetch_retries, 3);
        assert!(config.repair.enabled);
        assert!(config.repair.delete_recovery_files);
        assert!(config.extraction.enabled);
        assert!(config.extraction.delete_archives);
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_header() {
        let mut config = valid_config();
        config.header = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "header"));
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut config = valid_config();
        config.server.host = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "server.host"));
    }

    #[test]
    fn validate_rejects_zero_connections() {
        let mut config = valid_config();
        config.server.connections = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, Error::Config { key: Some(ref k), .. } if k == "server.connections")
        );
    }

    #[test]
    fn server_config_converts_with_credentials() {
        let ours = ServerConfig {
            host: "news.example.com".into(),
            port: 563,
            tls: true,
            username: Some("user1".into()),
            password: Some("secret".into()),
            connections: 10,
        };

        let nntp: nntp_rs::ServerConfig = ours.into();

        assert_eq!(nntp.host, "news.example.com");
        assert_eq!(nntp.port, 563);
        assert!(nntp.tls, "TLS flag must be forwarded");
        assert!(!nntp.allow_insecure_tls, "insecure TLS must always be false");
        assert_eq!(nntp.username, "user1");
        assert_eq!(nntp.password, "secret");
    }

    #[test]
    fn server_config_converts_without_credentials() {
        let ours = ServerConfig {
            host: "news.example.com".into(),
            port: 119,
            ..Default::default()
        };

        let nntp: nntp_rs::ServerConfig = ours.into();

        assert_eq!(nntp.username, "", "missing username becomes empty string");
        assert_eq!(nntp.password, "", "missing password becomes empty string");
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = valid_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(back.server.host, config.server.host);
        assert_eq!(back.header, config.header);
        assert_eq!(back.connect_wait, config.connect_wait);
        assert_eq!(back.temp_dir, config.temp_dir);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let json = r#"{
            "server": { "host": "news.example.com", "port": 119 },
            "header": "dGVzdDo1OjI="
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.server.connections, 50);
        assert_eq!(config.fetch_retries, 3);
        assert!(config.repair.enabled);
        assert_eq!(config.temp_dir, PathBuf::from("./temp"));
        assert_eq!(config.dest_dir, PathBuf::from("./downloads"));
    }
}
