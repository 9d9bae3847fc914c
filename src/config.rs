// Runtime configuration: YAML file, then environment, then CLI flags

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.thesisdesk` store
    pub store_path: PathBuf,
    /// Auth id of the signed-in admin, if any
    pub actor: Option<String>,
    pub load_timeout_secs: u64,
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("."),
            actor: None,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            export_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Default config file location: `<config dir>/thesisdesk/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("thesisdesk").join("config.yaml"))
    }

    /// Load from `path`, or the default location when `None`
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(p) if p.exists() => {
                let content = fs::read_to_string(&p).with_context(|| format!("Failed to read config {}", p.display()))?;
                let config: Config =
                    serde_yaml::from_str(&content).with_context(|| format!("Invalid config {}", p.display()))?;
                info!(path = ?p, "Loaded config");
                config
            }
            Some(p) => {
                debug!(path = ?p, "No config file, using defaults");
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(store) = var("THESISDESK_STORE") {
            self.store_path = PathBuf::from(store);
        }
        if let Some(actor) = var("THESISDESK_ACTOR").filter(|a| !a.trim().is_empty()) {
            self.actor = Some(actor);
        }
        if let Some(dir) = var("THESISDESK_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
        if let Some(raw) = var("THESISDESK_LOAD_TIMEOUT_SECS") {
            match raw.trim().parse() {
                Ok(secs) => self.load_timeout_secs = secs,
                Err(e) => warn!(value = %raw, error = %e, "Invalid THESISDESK_LOAD_TIMEOUT_SECS, keeping current value"),
            }
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        let loaded = Config::load(Some(&temp.path().join("absent.yaml"))).unwrap();

        // Environment may add overrides; the file part must be defaults
        config.apply_env(|key| env::var(key).ok());
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "store_path: /srv/theses\nload_timeout_secs: 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        // Environment overrides win over the file, so compare against the same layering
        let mut expected = Config {
            store_path: PathBuf::from("/srv/theses"),
            load_timeout_secs: 3,
            ..Config::default()
        };
        expected.apply_env(|key| env::var(key).ok());
        assert_eq!(config, expected);
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "load_timeout_secs: [not, a, number]\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("THESISDESK_STORE", "/data"),
            ("THESISDESK_ACTOR", "auth-admin"),
            ("THESISDESK_LOAD_TIMEOUT_SECS", "oops"),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.store_path, PathBuf::from("/data"));
        assert_eq!(config.actor.as_deref(), Some("auth-admin"));
        assert_eq!(config.load_timeout_secs, DEFAULT_LOAD_TIMEOUT_SECS);
    }
}
