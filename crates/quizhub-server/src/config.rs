use std::time::Duration;

use serde::Deserialize;

/// Name of the optional config file read from the working directory.
pub const CONFIG_FILE: &str = "quizhub.toml";

/// Top-level server configuration, loaded from `quizhub.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    pub auth: AuthFileConfig,
    pub ws: WsConfig,
    pub rooms: RoomsConfig,
    pub tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            auth: AuthFileConfig::default(),
            ws: WsConfig::default(),
            rooms: RoomsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    /// Bearer token for the question endpoints. None = open.
    pub api_token: Option<String>,
}

/// WebSocket transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Origins allowed to open a socket, in addition to same-host requests.
    pub allowed_origins: Vec<String>,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub ping_period_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per connection. A full queue evicts the client.
    pub outbound_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            ping_period_secs: 54,
            max_message_size: 512,
            outbound_buffer: 256,
        }
    }
}

impl WsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }
}

/// Room lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub idle_timeout_secs: u64,
    pub idle_check_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            idle_check_interval_secs: 1800,
        }
    }
}

/// TLS termination. Served over HTTPS by default; set `enabled = false`
/// (or `TLS_ENABLED=false`) to run plain HTTP behind a proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// PEM certificate chain.
    pub cert_file: String,
    /// PEM private key (PKCS#8, PKCS#1 or SEC1).
    pub key_file: String,
    /// Lowest protocol version offered: "1.2" or "1.3".
    pub min_version: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cert_file: "cert.pem".to_string(),
            key_file: "key.pem".to_string(),
            min_version: "1.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMinVersion {
    Tls12,
    Tls13,
}

impl TlsConfig {
    pub fn min_version(&self) -> Result<TlsMinVersion, ConfigError> {
        match self.min_version.trim() {
            "1.2" => Ok(TlsMinVersion::Tls12),
            "1.3" => Ok(TlsMinVersion::Tls13),
            other => Err(ConfigError::UnsupportedTlsVersion(other.to_string())),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidListenAddr(String),
    ZeroValue(&'static str),
    PingNotBeforeRead { ping_secs: u64, read_secs: u64 },
    UnsupportedTlsVersion(String),
    MissingTlsFile(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenAddr(addr) => {
                write!(f, "listen_addr is not a valid socket address: {addr}")
            },
            Self::ZeroValue(field) => write!(f, "{field} must be > 0"),
            Self::PingNotBeforeRead {
                ping_secs,
                read_secs,
            } => write!(
                f,
                "ws.ping_period_secs ({ping_secs}) must be less than ws.read_timeout_secs ({read_secs})"
            ),
            Self::UnsupportedTlsVersion(v) => {
                write!(f, "tls.min_version must be \"1.2\" or \"1.3\", got {v:?}")
            },
            Self::MissingTlsFile(field) => write!(f, "{field} must be set when TLS is enabled"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a boolean env value the way most deployment tooling writes them.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated origin list, trimming whitespace and any
/// trailing `/`.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    /// Check the configuration for values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }

        let ws = &self.ws;
        for (field, value) in [
            ("ws.read_timeout_secs", ws.read_timeout_secs),
            ("ws.write_timeout_secs", ws.write_timeout_secs),
            ("ws.ping_period_secs", ws.ping_period_secs),
            ("rooms.idle_timeout_secs", self.rooms.idle_timeout_secs),
            ("rooms.idle_check_interval_secs", self.rooms.idle_check_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(field));
            }
        }
        if ws.max_message_size == 0 {
            return Err(ConfigError::ZeroValue("ws.max_message_size"));
        }
        if ws.outbound_buffer == 0 {
            return Err(ConfigError::ZeroValue("ws.outbound_buffer"));
        }
        if ws.ping_period_secs >= ws.read_timeout_secs {
            return Err(ConfigError::PingNotBeforeRead {
                ping_secs: ws.ping_period_secs,
                read_secs: ws.read_timeout_secs,
            });
        }

        if self.tls.enabled {
            self.tls.min_version()?;
            if self.tls.cert_file.trim().is_empty() {
                return Err(ConfigError::MissingTlsFile("tls.cert_file"));
            }
            if self.tls.key_file.trim().is_empty() {
                return Err(ConfigError::MissingTlsFile("tls.key_file"));
            }
        } else {
            tracing::info!("TLS disabled, serving plain HTTP");
        }

        if self.auth.api_token.is_some() {
            tracing::warn!(
                "api_token is set in config file; prefer the QUIZHUB_API_TOKEN env var in production"
            );
        }
        if self.ws.allowed_origins.is_empty() {
            tracing::info!("No WS origins configured, only same-host upgrades are accepted");
        }
        Ok(())
    }

    /// Load config from `quizhub.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from {CONFIG_FILE}");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse {CONFIG_FILE}: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No {CONFIG_FILE} found, using defaults");
                ServerConfig::default()
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| var(key).filter(|v| !v.is_empty());

        // HOST/PORT first so the more specific variable wins.
        let host = get("HOST");
        let port = get("PORT");
        if host.is_some() || port.is_some() {
            let (cur_host, cur_port) = self
                .listen_addr
                .rsplit_once(':')
                .unwrap_or((self.listen_addr.as_str(), "8080"));
            self.listen_addr = format!(
                "{}:{}",
                host.as_deref().unwrap_or(cur_host),
                port.as_deref().unwrap_or(cur_port)
            );
        }
        if let Some(addr) = get("QUIZHUB_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(root) = get("QUIZHUB_WEB_ROOT") {
            self.web_root = root;
        }
        if let Some(token) = get("QUIZHUB_API_TOKEN") {
            self.auth.api_token = Some(token);
        }
        if let Some(origins) = get("WS_ALLOWED_ORIGINS") {
            self.ws.allowed_origins = parse_origin_list(&origins);
        }

        if let Some(val) = get("WS_READ_TIMEOUT")
            && let Ok(n) = val.parse::<u64>()
        {
            self.ws.read_timeout_secs = n;
        }
        if let Some(val) = get("WS_WRITE_TIMEOUT")
            && let Ok(n) = val.parse::<u64>()
        {
            self.ws.write_timeout_secs = n;
        }
        if let Some(val) = get("WS_PING_PERIOD")
            && let Ok(n) = val.parse::<u64>()
        {
            self.ws.ping_period_secs = n;
        }
        if let Some(val) = get("WS_MAX_MESSAGE_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            self.ws.max_message_size = n;
        }

        if let Some(val) = get("TLS_ENABLED") {
            match parse_bool(&val) {
                Some(enabled) => self.tls.enabled = enabled,
                None => tracing::warn!(value = %val, "Ignoring unparsable TLS_ENABLED"),
            }
        }
        if let Some(cert) = get("TLS_CERT_FILE") {
            self.tls.cert_file = cert;
        }
        if let Some(key) = get("TLS_KEY_FILE") {
            self.tls.key_file = key;
        }
        if let Some(version) = get("TLS_MIN_VERSION") {
            self.tls.min_version = version;
        }
    }
}
