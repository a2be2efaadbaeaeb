use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Settings for the sync client, read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./playvault-client")
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            data_dir: default_data_dir(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            session_token: None,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        if config.server_url.trim().is_empty() {
            return Err(Error::Config("server_url cannot be empty".to_string()));
        }
        if config.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn offline_db_path(&self) -> PathBuf {
        self.data_dir.join("offline.db")
    }

    #[must_use]
    pub fn hydration_db_path(&self) -> PathBuf {
        self.data_dir.join("hydration.db")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = ClientConfig::from_toml(r#"server_url = "http://localhost:8080""#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(config.session_token.is_none());
        assert!(config.offline_db_path().ends_with("offline.db"));
        assert!(config.hydration_db_path().ends_with("hydration.db"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = ClientConfig::from_toml(
            "server_url = \"http://localhost\"\nrequest_timeout_secs = 0\n",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.toml");

        let mut config = ClientConfig::new("http://localhost:8080");
        config.session_token = Some("pvs_abc_def".to_string());
        config.save(&path).unwrap();

        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }
}
