use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A device-name prefix the tunnel tool assigns, and the profile-name prefix it
/// stands in for (macOS hands out `utunN` for a profile called `wgN`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSwap {
    pub device: String,
    pub profile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the `*.conf` profiles to rotate through
    pub config_dir: PathBuf,

    pub wg_binary: PathBuf,
    pub wg_quick_binary: PathBuf,

    /// Other places a profile may live when tearing down an unmapped interface
    pub alternate_config_dirs: Vec<PathBuf>,
    pub device_prefix_swaps: Vec<PrefixSwap>,
    pub candidate_suffixes: Vec<String>,

    /// Try `down` with every listed profile before falling back to the bare name
    pub sweep_profiles: bool,

    pub auto_rotate: bool,
    pub switch_interval_secs: u64,
    pub settle_delay_ms: u64,
    pub command_timeout_secs: u64,

    /// Address the status endpoint listens on
    pub http_bind: String,

    pub lookup_services: Vec<String>,
    pub lookup_timeout_secs: u64,

    pub notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let config_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wireguard");

        Self {
            config_dir,
            wg_binary: default_tool_path("wg"),
            wg_quick_binary: default_tool_path("wg-quick"),
            alternate_config_dirs: vec![
                PathBuf::from("/opt/homebrew/etc/wireguard"),
                PathBuf::from("/etc/wireguard"),
            ],
            device_prefix_swaps: vec![PrefixSwap {
                device: "utun".to_string(),
                profile: "wg".to_string(),
            }],
            candidate_suffixes: vec!["_wireguard".to_string()],
            sweep_profiles: false,
            auto_rotate: true,
            switch_interval_secs: 180,
            settle_delay_ms: 2000,
            command_timeout_secs: 30,
            http_bind: "127.0.0.1:3000".to_string(),
            lookup_services: vec![
                "https://ipinfo.io/json".to_string(),
                "https://api.myip.com".to_string(),
                "https://ifconfig.me/all.json".to_string(),
            ],
            lookup_timeout_secs: 5,
            notifications: true,
        }
    }
}

/// Homebrew installs the tools under /opt/homebrew on Apple Silicon; everywhere
/// else they live in /usr/bin.
fn default_tool_path(name: &str) -> PathBuf {
    let homebrew = Path::new("/opt/homebrew/bin").join(name);
    if cfg!(target_os = "macos") || homebrew.exists() {
        homebrew
    } else {
        Path::new("/usr/bin").join(name)
    }
}

impl AppConfig {
    /// Get the config file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("wg-rotator");

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!("Could not create config directory: {}", e);
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file, or create default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Ok(p) => p,
                Err(_) => return Ok(AppConfig::default()),
            },
        };

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to parse config {}: {}", path.display(), e),
                },
                Err(e) => tracing::warn!("Failed to read config {}: {}", path.display(), e),
            }
            return Ok(AppConfig::default());
        }

        let config = AppConfig::default();
        if let Err(e) = config.save(&path) {
            tracing::debug!("Could not write default config: {}", e);
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn switch_interval(&self) -> Duration {
        Duration::from_secs(self.switch_interval_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            config_dir: PathBuf::from("/tmp/profiles"),
            sweep_profiles: true,
            switch_interval_secs: 60,
            ..Default::default()
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.config_dir, config.config_dir);
        assert!(deserialized.sweep_profiles);
        assert_eq!(deserialized.switch_interval(), Duration::from_secs(60));
        assert_eq!(deserialized.device_prefix_swaps, config.device_prefix_swaps);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = toml::from_str("settle_delay_ms = 500\n").unwrap();

        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.switch_interval_secs, 180);
        assert_eq!(config.lookup_services.len(), 3);
    }

    #[test]
    fn test_zero_durations_are_clamped() {
        let config: AppConfig = toml::from_str("command_timeout_secs = 0\nswitch_interval_secs = 0\n").unwrap();

        assert_eq!(config.command_timeout(), Duration::from_secs(1));
        assert_eq!(config.switch_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.http_bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_load_falls_back_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "switch_interval_secs = \"soon\"").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert_eq!(config.switch_interval_secs, 180);
    }
}
