//! `chatinterface whoami`: show the account behind the saved credential.

use anyhow::{Context, Result};

use chatinterface_client::{ChatApi, HttpChatApi};

use crate::config::Config;

pub async fn run(server: Option<&str>, cfg: &Config) -> Result<()> {
    let store = super::secret_store()?;
    let session = super::saved_session(&store, server)?;
    let api = HttpChatApi::new(
        &session.http_origin,
        Some(&session.credential),
        cfg.request_timeout(),
    )?;

    let info = api
        .show_token_info(&session.credential)
        .await
        .with_context(|| format!("failed to look up token on {}", session.http_origin))?;

    println!("{} on {}", info.username, session.http_origin);
    Ok(())
}
