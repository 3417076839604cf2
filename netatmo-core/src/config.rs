use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{error::ConfigError, model::TokenResponse};

/// Name of the config file inside the resolved directory.
pub const CONFIG_FILE_NAME: &str = "netatmo.cfg";

/// Environment variable overriding the directory holding the config file.
pub const CONFIG_DIR_ENV: &str = "NETATMO_CFG_PATH";

/// Tokens returned by the last successful grant, plus the computed expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: Vec<String>,
    pub expires_in: i64,
    pub expire_in: i64,

    /// Absolute expiry in unix seconds. Authoritative for validity checks.
    pub end_time: i64,

    /// Informational only.
    pub end_time_date: String,
}

impl TokenSet {
    /// Build a token set from a grant response, measuring expiry from `issued_at`
    /// (the invocation start) rather than the issuer's clock.
    pub fn issued(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let end_time = issued_at.timestamp() + response.expires_in;
        let end_time_date = DateTime::from_timestamp(end_time, 0)
            .map(|dt| {
                dt.with_timezone(&Local)
                    .format("%Y%m%d_%H:%M:%S_%Z")
                    .to_string()
            })
            .unwrap_or_default();

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            scope: response.scope,
            expires_in: response.expires_in,
            expire_in: response.expire_in,
            end_time,
            end_time_date,
        }
    }

    /// Exact-boundary check: a token whose expiry equals `now` is still valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() - self.end_time > 0 || self.access_token.is_empty()
    }
}

/// Record stored on disk between invocations.
///
/// Login identifier and secret have no field here, so they cannot be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersistedConfig {
    pub client_id: String,
    pub client_secret: String,

    #[serde(flatten)]
    pub tokens: TokenSet,

    pub google_api_key: String,
}

impl PersistedConfig {
    /// Returns the Google API key, if one is stored.
    pub fn google_api_key(&self) -> Option<&str> {
        Some(self.google_api_key.as_str()).filter(|key| !key.is_empty())
    }

    /// Replace the stored Google API key. Returns `true` when the value changed.
    pub fn set_google_api_key(&mut self, key: &str) -> bool {
        if self.google_api_key == key {
            return false;
        }
        self.google_api_key = key.to_string();
        true
    }
}

/// Location of the persisted config and its load/save operations.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Use `override_dir` if given, otherwise the current working directory.
    pub fn resolve(override_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let dir = match override_dir.filter(|dir| !dir.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(ConfigError::CurrentDir)?,
        };

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the config file.
    pub fn config_file_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Load config from disk. A missing file means "no prior session" and yields `None`.
    pub fn load(&self) -> Result<Option<PersistedConfig>, ConfigError> {
        let path = self.config_file_path();

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file yet");
                return Ok(None);
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let cfg = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        Ok(Some(cfg))
    }

    /// Save config to disk, replacing the previous file in one rename.
    ///
    /// The file is readable and writable by its owner only.
    pub fn save(&self, config: &PersistedConfig) -> Result<PathBuf, ConfigError> {
        let path = self.config_file_path();

        fs::create_dir_all(&self.dir).map_err(|source| ConfigError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)?;

        let tmp = path.with_extension("cfg.tmp");
        write_owner_only(&tmp, json.as_bytes()).map_err(|source| ConfigError::Write {
            path: tmp.clone(),
            source,
        })?;

        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            ConfigError::Write {
                path: path.clone(),
                source,
            }
        })?;

        debug!(path = %path.display(), "config saved");
        Ok(path)
    }
}

fn write_owner_only(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // mode() only applies on creation; a stale temp file keeps its old bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.sync_all()
}
