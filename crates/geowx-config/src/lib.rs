use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_PROVIDER: &str = "open-meteo";
pub const DEFAULT_PROVIDER_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_STATE_PATH: &str = "geowx-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// `open-meteo` or `simulator`
    pub kind: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub debounce_ms: Option<u64>,
    /// Re-run the refresh on a timer; off when absent or zero
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: Option<ServerConfig>,
    pub provider: Option<ProviderConfig>,
    pub refresh: Option<RefreshConfig>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppConfig {
    /// Load configuration from GEOWX_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GEOWX_CONFIG").unwrap_or_else(|_| "geowx.toml".to_string());
        Self::load_from(path)
    }

    /// Load from an explicit path; a missing file yields the defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&s)?
        } else {
            AppConfig::default()
        };
        Ok(cfg)
    }

    /// Get HTTP bind address (default 0.0.0.0:8080)
    pub fn http_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn provider_kind(&self) -> String {
        self.provider
            .as_ref()
            .and_then(|p| p.kind.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
    }

    pub fn provider_base_url(&self) -> String {
        self.provider
            .as_ref()
            .and_then(|p| p.base_url.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string())
    }

    /// Quiet period before a refresh pass runs
    pub fn debounce(&self) -> Duration {
        let ms = self
            .refresh
            .as_ref()
            .and_then(|r| r.debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        Duration::from_millis(ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh
            .as_ref()
            .and_then(|r| r.interval_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.state_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.http_bind(), "0.0.0.0:8080");
        assert_eq!(cfg.provider_kind(), "open-meteo");
        assert_eq!(cfg.provider_base_url(), DEFAULT_PROVIDER_URL);
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.refresh_interval(), None);
        assert_eq!(cfg.state_path(), PathBuf::from("geowx-state.json"));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.http_bind(), DEFAULT_BIND);
    }

    #[test]
    fn reads_all_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geowx.toml");
        fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:9000"

[provider]
kind = "simulator"

[refresh]
debounce_ms = 250
interval_secs = 900

[storage]
state_path = "/var/lib/geowx/state.json"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.http_bind(), "127.0.0.1:9000");
        assert_eq!(cfg.provider_kind(), "simulator");
        assert_eq!(cfg.provider_base_url(), DEFAULT_PROVIDER_URL);
        assert_eq!(cfg.debounce(), Duration::from_millis(250));
        assert_eq!(cfg.refresh_interval(), Some(Duration::from_secs(900)));
        assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/geowx/state.json"));
    }

    #[test]
    fn zero_interval_disables_timer() {
        let cfg: AppConfig = toml::from_str("[refresh]\ninterval_secs = 0\n").unwrap();
        assert_eq!(cfg.refresh_interval(), None);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geowx.toml");
        fs::write(&path, "[server\nbind = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::Toml(_))
        ));
    }
}
