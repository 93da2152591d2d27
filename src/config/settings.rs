use crate::error::{AppError, AppResult};
use crate::ssh::RemoteConnectionParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub ops: OpsSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// The single administrative host that pool and transfer operations target.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: None,
            key_path: None,
            key_passphrase: None,
        }
    }
}

// Keep credentials out of debug output and logs.
impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("key_path", &self.key_path)
            .field("key_passphrase", &self.key_passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound for a whole façade call; 0 disables the deadline.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    600
}

impl Default for OpsSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl OpsSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        match self.call_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Local paths reported by `storage info`.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl AppSettings {
    pub fn load(config_dir: &Path) -> AppResult<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load_file(&config_path)
        } else {
            let settings = AppSettings::default();
            settings.save(config_dir)?;
            Ok(settings)
        }
    }

    /// Load an explicit settings file; unlike `load` it never creates one.
    pub fn load_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: AppSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    pub fn save(&self, config_dir: &Path) -> AppResult<()> {
        std::fs::create_dir_all(config_dir)?;
        let config_path = config_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Copy safe to print: stored secrets replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |secret: &mut Option<String>| {
            if secret.is_some() {
                *secret = Some("[REDACTED]".to_string());
            }
        };
        mask(&mut copy.remote.password);
        mask(&mut copy.remote.key_passphrase);
        copy
    }

    /// Connection parameters for the configured host.
    ///
    /// Fails before any network attempt when host or username is missing.
    pub fn connection_params(&self) -> AppResult<RemoteConnectionParams> {
        let remote = &self.remote;
        if remote.host.trim().is_empty() || remote.username.trim().is_empty() {
            return Err(AppError::Configuration(
                "SSH connection not configured. Please set SSH host and username.".to_string(),
            ));
        }

        Ok(RemoteConnectionParams {
            host: remote.host.trim().to_string(),
            port: remote.port,
            username: remote.username.trim().to_string(),
            password: remote.password.clone(),
            key_path: remote.key_path.clone().filter(|p| !p.as_os_str().is_empty()),
            key_passphrase: remote.key_passphrase.clone(),
            connect_timeout: self.ops.connect_timeout(),
        })
    }
}
