//! `chatinterface login`: exchange a username and password for a token.
//!
//! Prompts for whatever was not given on the command line, creates a token
//! on the server and remembers it (and the server) in the secret store.

use anyhow::{bail, Context, Result};
use dialoguer::{Input, Password};
use tracing::info;

use chatinterface_client::secrets;
use chatinterface_client::session::normalize_origin;
use chatinterface_client::{ChatApi, HttpChatApi};

use crate::config::Config;

/// Log in and save the credential.
pub async fn run(server: Option<&str>, username: Option<&str>, cfg: &Config) -> Result<()> {
    let server = match server.or(cfg.server()) {
        Some(server) => server.to_string(),
        None => prompt("Server URL")?,
    };
    let username = match username {
        Some(username) => username.to_string(),
        None => prompt("Username")?,
    };
    let password = Password::new()
        .with_prompt("Password")
        .allow_empty_password(true)
        .interact()
        .context("failed to read password")?;

    let origin = validate(&server, &username, &password)?;
    let api = HttpChatApi::new(&origin, None, cfg.request_timeout())?;
    let token = api
        .create_token(username.trim(), &password)
        .await
        .with_context(|| format!("login to {origin} failed"))?;

    let store = super::secret_store()?;
    secrets::save_login(&store, &origin, &token).context("failed to save credential")?;

    info!(server = %origin, "logged in");
    println!("Logged in to {origin} as {}", username.trim());
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .with_context(|| format!("failed to read {}", label.to_lowercase()))
}

/// Reject incomplete forms before any request; returns the normalized origin.
fn validate(server: &str, username: &str, password: &str) -> Result<String> {
    if server.trim().is_empty() {
        bail!("a server URL is required");
    }
    if username.trim().is_empty() {
        bail!("a username is required");
    }
    if password.is_empty() {
        bail!("a password is required");
    }
    Ok(normalize_origin(server)?)
}
