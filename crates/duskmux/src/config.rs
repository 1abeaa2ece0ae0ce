//! TOML configuration schemas for the `client` and `server` sub-commands,
//! per spec.md §6. Certificate/key file I/O and TOML loading are ambient
//! plumbing outside the specified core (spec.md §1's Non-goals), but the
//! schemas themselves are the external interface the CLI must honor exactly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse TOML config {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid duration string {0:?}")]
    Duration(String),
    #[error("field {0:?} is required")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which carrier a config selects, per spec.md §6 `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierType {
    Websocket,
    Quic,
}

/// Parses a duration string like `"30s"`, `"5m"`, `"1h"`, or a bare integer
/// (seconds), matching the informal format `original_source/config/*.go`
/// accepts for its `timeout` field.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    let (num, unit) = s.split_at(s.len() - 1);
    let n: u64 = num.parse().map_err(|_| Error::Duration(s.to_string()))?;
    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        _ => return Err(Error::Duration(s.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "type")]
    pub carrier_type: CarrierType,
    pub host: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub debug_ca: Option<PathBuf>,
    pub listen_addr: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    pub secret: String,
    #[serde(default = "default_period")]
    pub period: u64,
    #[serde(default)]
    pub pprof: Option<String>,
    /// Extension beyond the literal schema in spec.md §6: lets an operator
    /// override the pool's default `MAX_STREAMS_PER_MANAGER` without a code
    /// change. Absent from the spec's recognized-options list, so it is
    /// optional and defaults to [`duskmux_pool::DEFAULT_MAX_STREAMS_PER_MANAGER`].
    #[serde(default)]
    pub max_streams_per_manager: Option<u32>,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }

    pub fn ws_path(&self) -> &str {
        self.path.as_deref().unwrap_or("/ws")
    }

    pub fn handshake_timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout)
    }

    pub fn debug_ca_pem(&self) -> Result<Option<Vec<u8>>> {
        read_optional_pem(self.debug_ca.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "type")]
    pub carrier_type: CarrierType,
    pub host: String,
    #[serde(default)]
    pub path: Option<String>,
    pub listen_addr: String,
    pub key: PathBuf,
    pub crt: PathBuf,
    pub secret: String,
    #[serde(default = "default_period")]
    pub period: u64,
    #[serde(default = "default_timeout")]
    pub timeout: String,

    #[serde(default)]
    pub web_root: Option<PathBuf>,
    #[serde(default)]
    pub web_key: Option<PathBuf>,
    #[serde(default)]
    pub web_crt: Option<PathBuf>,
    #[serde(default)]
    pub web_host: Option<String>,

    #[serde(default)]
    pub reverse_proxy_host: Option<String>,
    #[serde(default)]
    pub reverse_proxy_key: Option<PathBuf>,
    #[serde(default)]
    pub reverse_proxy_crt: Option<PathBuf>,
    #[serde(default)]
    pub reverse_proxy_addr: Option<String>,

    #[serde(default)]
    pub pprof: Option<String>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_toml(path)
    }

    pub fn ws_path(&self) -> &str {
        self.path.as_deref().unwrap_or("/ws")
    }

    pub fn handshake_timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout)
    }

    pub fn cert_pem(&self) -> Result<Vec<u8>> {
        read_pem(&self.crt)
    }

    pub fn key_pem(&self) -> Result<Vec<u8>> {
        read_pem(&self.key)
    }

    /// `web_root`/`web_key`/`web_crt`/`web_host` enable static web serving
    /// only when all four are present, per spec.md §6.
    pub fn web_enabled(&self) -> bool {
        self.web_root.is_some() && self.web_key.is_some() && self.web_crt.is_some() && self.web_host.is_some()
    }

    /// `reverse_proxy_host`/`reverse_proxy_key`/`reverse_proxy_crt`/
    /// `reverse_proxy_addr` enable the reverse proxy only when all four are
    /// present, per spec.md §6.
    pub fn reverse_proxy_enabled(&self) -> bool {
        self.reverse_proxy_host.is_some()
            && self.reverse_proxy_key.is_some()
            && self.reverse_proxy_crt.is_some()
            && self.reverse_proxy_addr.is_some()
    }
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_period() -> u64 {
    duskmux_totp::DEFAULT_PERIOD
}

fn load_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| Error::Parse { path: path.to_path_buf(), source })
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })
}

fn read_optional_pem(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    match path {
        Some(p) => Ok(Some(read_pem(p)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds_and_suffixed_durations() {
        assert_eq!(parse_duration("30").expect("plain"), Duration::from_secs(30));
        assert_eq!(parse_duration("30s").expect("seconds"), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").expect("minutes"), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").expect("hours"), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_garbage_duration() {
        assert!(parse_duration("banana").is_err());
    }

    #[test]
    fn client_config_round_trips_from_toml() {
        let toml = r#"
            type = "websocket"
            host = "example.com:8443"
            path = "/ws"
            listen_addr = "127.0.0.1:1080"
            secret = "JBSWY3DPEHPK3PXP"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).expect("parse");
        assert_eq!(cfg.carrier_type, CarrierType::Websocket);
        assert_eq!(cfg.period, duskmux_totp::DEFAULT_PERIOD);
        assert_eq!(cfg.ws_path(), "/ws");
    }

    #[test]
    fn server_config_detects_optional_features() {
        let toml = r#"
            type = "websocket"
            host = "example.com"
            listen_addr = "0.0.0.0:8443"
            key = "server.key"
            crt = "server.crt"
            secret = "JBSWY3DPEHPK3PXP"
        "#;
        let cfg: ServerConfig = toml::from_str(toml).expect("parse");
        assert!(!cfg.web_enabled());
        assert!(!cfg.reverse_proxy_enabled());
    }
}
