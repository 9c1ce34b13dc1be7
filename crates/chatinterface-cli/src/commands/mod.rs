//! CLI subcommand implementations.

pub mod chat;
pub mod login;
pub mod logout;
pub mod whoami;

use anyhow::{Context, Result};

use chatinterface_client::secrets::{self, FileSecretStore, SecretStore, TOKEN_SCOPE};
use chatinterface_client::session::{normalize_origin, Session};

pub(crate) fn secret_store() -> Result<FileSecretStore> {
    FileSecretStore::default_location().context("failed to locate the secret store")
}

/// Build a session from stored credentials.
///
/// With `server` given, its stored credential is used; otherwise the last
/// login is.
pub(crate) fn saved_session(store: &dyn SecretStore, server: Option<&str>) -> Result<Session> {
    let (origin, credential) = match server {
        Some(server) => {
            let origin = normalize_origin(server)?;
            let credential = store
                .get(TOKEN_SCOPE, &origin)?
                .with_context(|| format!("not logged in to {origin}; run `chatinterface login`"))?;
            (origin, credential)
        }
        None => secrets::saved_login(store)?
            .context("not logged in; run `chatinterface login`")?,
    };
    Ok(Session::new(&origin, credential)?)
}
