//! Save an API token for later commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use sync_client::config::normalize_server;

use crate::config::StoredCredentials;

/// Run the login command.
pub async fn run(config_dir: &Path, server: &str) -> Result<()> {
    let server = normalize_server(server);
    println!("Create an API key at {}/keygen", server);
    let token = prompt_token(&format!("API token for {}: ", server))?;

    let path = save(config_dir, &server, &token).await?;
    println!();
    println!("Credentials saved to {}", path.display());
    Ok(())
}

/// Persist a token for a server.
pub async fn save(config_dir: &Path, server: &str, token: &str) -> Result<PathBuf> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }
    StoredCredentials::new(server, token).save(config_dir).await
}

/// Prompt for the token with echo suppression.
fn prompt_token(prompt: &str) -> Result<String> {
    let token = rpassword::prompt_password(prompt).context("Failed to read token")?;
    Ok(token.trim().to_string())
}
