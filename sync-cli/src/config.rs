//! Credential storage and resolution.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sync_client::config::normalize_server;
use sync_client::{ClientConfig, DEFAULT_SERVER};

/// Name of the credential file inside the config directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Server and token saved by `login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Server the token belongs to.
    pub server: String,
    /// API token.
    pub token: String,
}

impl StoredCredentials {
    /// Create credentials for a server.
    pub fn new(server: &str, token: &str) -> Self {
        Self {
            server: normalize_server(server),
            token: token.trim().to_string(),
        }
    }

    /// Path of the credential file in `config_dir`.
    pub fn path(config_dir: &Path) -> PathBuf {
        config_dir.join(CREDENTIALS_FILE)
    }

    /// Load credentials, or `None` if nobody has logged in yet.
    pub async fn load(config_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(config_dir);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read credentials from {}", path.display()))
            }
        };
        let credentials = serde_json::from_str(&contents).with_context(|| {
            format!(
                "Invalid credential file {}. Run 'openneuro login' again.",
                path.display()
            )
        })?;
        Ok(Some(credentials))
    }

    /// Save credentials, readable by the owner only.
    pub async fn save(&self, config_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(config_dir)
            .await
            .context("Failed to create config directory")?;
        set_dir_permissions_0700(config_dir).await?;

        let path = Self::path(config_dir);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save credentials")?;
        set_file_permissions_0600(&path).await?;
        Ok(path)
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("server", &self.server)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Work out which server to talk to and with which token.
///
/// Each value comes from the environment/flags first, then the credential
/// file, then the built-in default. A stored token is only used for the
/// server it was saved for.
pub fn resolve_credentials(
    server: Option<&str>,
    token: Option<&str>,
    stored: Option<&StoredCredentials>,
) -> ClientConfig {
    let server = server
        .filter(|s| !s.trim().is_empty())
        .map(normalize_server)
        .or_else(|| stored.map(|c| c.server.clone()))
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let token = token.map(str::to_string).or_else(|| {
        stored
            .filter(|c| normalize_server(&c.server) == server)
            .map(|c| c.token.clone())
    });

    ClientConfig::new(&server).with_token(token)
}

/// Default config directory (`~/.openneuro`).
pub fn default_config_dir() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().context("Could not determine home directory")?;
    Ok(dirs.home_dir().join(".openneuro"))
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
