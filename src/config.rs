//! Service configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Top level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address where to host the service
    #[serde(default = "Config::default_host")]
    pub host: SocketAddr,

    /// Sqlite connection string
    #[serde(default = "Config::default_database_url")]
    pub database_url: String,

    /// Directory served for the HTML pages
    #[serde(default = "Config::default_static_dir")]
    pub static_dir: PathBuf,

    /// `Max-Age` of the session cookie, in seconds
    #[serde(default = "Config::default_session_max_age_secs")]
    pub session_max_age_secs: i64,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    fn default_host() -> SocketAddr {
        ([127, 0, 0, 1], 5999).into()
    }

    fn default_database_url() -> String {
        "sqlite://todo.db?mode=rwc".to_owned()
    }

    fn default_static_dir() -> PathBuf {
        "static".into()
    }

    fn default_session_max_age_secs() -> i64 {
        28800
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            database_url: Self::default_database_url(),
            static_dir: Self::default_static_dir(),
            session_max_age_secs: Self::default_session_max_age_secs(),
            logging: Logging::default(),
        }
    }
}

/// Reads the config file, falling back to defaults when it does not exist.
pub fn load(path: &Path) -> color_eyre::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(err) => Err(err.into()),
    }
}
