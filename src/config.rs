use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use ssolink::AppInfo;
use ssolink::transport::codec::DEFAULT_MAX_FRAME_LEN;
use ssolink::transport::{DEFAULT_HOST, DEFAULT_PORT, TransportOptions};

/// Default config directory: ~/.ssolink/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ssolink")
}

/// Default config file path: ~/.ssolink/settings.json
pub fn default_config_path() -> PathBuf {
    config_dir().join("settings.json")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    #[serde(default)]
    pub sign: Option<SignConfig>,
    #[serde(default)]
    pub app_info: Option<AppInfo>,
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignConfig {
    pub url: String,
    #[serde(default)]
    pub http_proxy: Option<String>,
}

fn default_version() -> u32 {
    1
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_heartbeat_interval() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    15
}
fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}
fn default_health_port() -> u16 {
    7789
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            reconnect_delay_secs: default_reconnect_delay(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_request_timeout(),
            max_frame_len: default_max_frame_len(),
            session_file: None,
            sign: None,
            app_info: None,
            health_port: default_health_port(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise; env vars win either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Apply SSOLINK_HOST / SSOLINK_PORT / SSOLINK_SIGN_URL.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = var("SSOLINK_HOST").filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = var("SSOLINK_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = var("SSOLINK_SIGN_URL").filter(|u| !u.is_empty()) {
            match self.sign.as_mut() {
                Some(sign) => sign.url = url,
                None => {
                    self.sign = Some(SignConfig {
                        url,
                        http_proxy: None,
                    })
                }
            }
        }
        self
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            host: self.server.host.clone(),
            port: self.server.port,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            heartbeat_interval: (self.heartbeat_interval_secs > 0)
                .then(|| Duration::from_secs(self.heartbeat_interval_secs)),
            connect_timeout: self.request_timeout(),
            register_timeout: self.request_timeout(),
            max_frame_len: self.max_frame_len,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Session identity file, ~/.ssolink/session.json unless configured.
    pub fn session_path(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| config_dir().join("session.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        let opts = config.transport_options();
        assert_eq!(opts.host, DEFAULT_HOST);
        assert_eq!(opts.port, 8080);
        assert_eq!(opts.reconnect_delay, Duration::from_secs(5));
        assert_eq!(opts.heartbeat_interval, Some(Duration::from_secs(300)));
        assert_eq!(opts.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.health_port, 7789);
        assert!(config.sign.is_none());
    }

    #[test]
    fn zero_heartbeat_disables_it() {
        let config: AppConfig =
            serde_json::from_str(r#"{"heartbeat_interval_secs": 0}"#).unwrap();
        assert_eq!(config.transport_options().heartbeat_interval, None);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "server": { "host": "a.example", "port": 1 },
            "sign": { "url": "http://old", "http_proxy": "http://p" },
        }))
        .unwrap();
        let config = config.with_overrides(|key| match key {
            "SSOLINK_HOST" => Some("b.example".to_string()),
            "SSOLINK_PORT" => Some("not a port".to_string()),
            "SSOLINK_SIGN_URL" => Some("http://new".to_string()),
            _ => None,
        });
        assert_eq!(config.server.host, "b.example");
        assert_eq!(config.server.port, 1);
        let sign = config.sign.unwrap();
        assert_eq!(sign.url, "http://new");
        assert_eq!(sign.http_proxy.as_deref(), Some("http://p"));
    }

    #[test]
    fn app_info_override_is_read_in_pascal_case() {
        let mut info = serde_json::to_value(AppInfo::default()).unwrap();
        info["SubAppId"] = 1.into();
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({ "app_info": info })).unwrap();
        assert_eq!(config.app_info.unwrap().sub_app_id, 1);
    }
}
