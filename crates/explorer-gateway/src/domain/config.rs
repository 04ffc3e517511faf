//! Gateway configuration with validation.
//!
//! Loaded from TOML; `EXPLORER_*` environment variables override single
//! values on top of the file.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::GatewayError;

/// Smallest outbox a connection may be configured with.
pub const MIN_OUTBOX_CAPACITY: usize = 256;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public endpoint: REST, explorer, `/websocket` and `/socket.io/`
    pub http: HttpConfig,
    /// Internal endpoint: `/health` and `/metrics`
    pub admin: AdminConfig,
    pub websocket: WebSocketConfig,
    pub socketio: SocketIoConfig,
    pub explorer: ExplorerConfig,
    pub features: FeaturesConfig,
    /// Page sizes
    pub limits: LimitsConfig,
    pub cors: CorsConfig,
    /// Upper bound on draining in-flight work at shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Leak internal error text and panic values to clients, reload
    /// templates per request
    pub debug: bool,
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            admin: AdminConfig::default(),
            websocket: WebSocketConfig::default(),
            socketio: SocketIoConfig::default(),
            explorer: ExplorerConfig::default(),
            features: FeaturesConfig::default(),
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            shutdown_timeout: Duration::from_secs(5),
            debug: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Parse a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read `path`, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `EXPLORER_*` overrides from `vars`. Unrelated variables are
    /// ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "EXPLORER_HTTP_HOST" => self.http.host = parse_env(&key, &value)?,
                "EXPLORER_HTTP_PORT" => self.http.port = parse_env(&key, &value)?,
                "EXPLORER_ADMIN_HOST" => self.admin.host = parse_env(&key, &value)?,
                "EXPLORER_ADMIN_PORT" => self.admin.port = parse_env(&key, &value)?,
                "EXPLORER_DEBUG" => self.debug = parse_env(&key, &value)?,
                "EXPLORER_SUBSCRIBE_NEW_TX" => {
                    self.features.subscribe_new_tx = parse_env(&key, &value)?
                }
                "EXPLORER_TEMPLATES_DIR" => {
                    self.explorer.templates_dir = Some(PathBuf::from(value))
                }
                "EXPLORER_LOG_LEVEL" => self.logging.level = value,
                "EXPLORER_LOG_JSON" => self.logging.json = parse_env(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.enabled && self.admin.enabled && self.http_addr() == self.admin_addr() {
            return Err(ConfigError::DuplicatePorts);
        }

        if self.websocket.outbox_capacity < MIN_OUTBOX_CAPACITY {
            return Err(ConfigError::InvalidLimit(format!(
                "websocket.outbox_capacity must be at least {}",
                MIN_OUTBOX_CAPACITY
            )));
        }

        if self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "websocket.max_message_size cannot be 0".into(),
            ));
        }

        let l = &self.limits;
        if l.txs_on_page == 0 || l.blocks_on_page == 0 || l.mempool_txs_on_page == 0 || l.txs_in_api == 0
        {
            return Err(ConfigError::InvalidLimit("page sizes cannot be 0".into()));
        }

        if self.websocket.ping_deadline.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "websocket.ping_deadline cannot be 0".into(),
            ));
        }

        if self.socketio.ping_interval.is_zero() || self.socketio.ping_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "socketio ping interval and timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Public server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}={} cannot be parsed", key, value)))
}

/// Public HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: IpAddr,
    /// Port (default: 9130)
    pub port: u16,
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 9130,
            enabled: true,
        }
    }
}

/// Admin server configuration (localhost only by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub host: IpAddr,
    /// Port (default: 9030)
    pub port: u16,
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 9030,
            enabled: true,
        }
    }
}

/// Native WebSocket transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    /// Frames buffered per connection before it is shed
    pub outbox_capacity: usize,
    /// Deadline for control-frame writes
    #[serde(with = "humantime_serde")]
    pub ping_deadline: Duration,
    /// Largest accepted inbound frame in bytes
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outbox_capacity: 500,
            ping_deadline: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
        }
    }
}

/// Socket.IO transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketIoConfig {
    pub enabled: bool,
    /// Advertised in the handshake
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Advertised in the handshake
    #[serde(with = "humantime_serde")]
    pub ping_timeout: Duration,
}

impl Default for SocketIoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(60),
        }
    }
}

/// Server-rendered explorer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub enabled: bool,
    /// Directory with `*.html` templates; embedded templates when unset
    pub templates_dir: Option<PathBuf>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            templates_dir: None,
        }
    }
}

/// Optional features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Allow `subscribeNewTransaction` on the WebSocket API
    pub subscribe_new_tx: bool,
}

/// Page sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub txs_on_page: u32,
    pub blocks_on_page: u32,
    pub mempool_txs_on_page: u32,
    /// Page size of REST address and block queries
    pub txs_in_api: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            txs_on_page: 25,
            blocks_on_page: 50,
            mempool_txs_on_page: 50,
            txs_in_api: 1000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache in seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 86400,
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Public and admin servers bound to the same address
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// TOML could not be parsed
    #[error("parse error: {0}")]
    Parse(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization in the `30s` / `250ms` / `2m` forms
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be tried before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
