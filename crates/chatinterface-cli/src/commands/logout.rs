//! `chatinterface logout`: forget a saved credential.

use anyhow::Result;
use tracing::info;

use chatinterface_client::secrets::{self, SecretStore, HOST_SCOPE, SAVED_HOST_KEY, TOKEN_SCOPE};
use chatinterface_client::session::normalize_origin;

pub async fn run(server: Option<&str>) -> Result<()> {
    let store = super::secret_store()?;
    match forget(&store, server)? {
        Some(origin) => {
            info!(server = %origin, "logged out");
            println!("Logged out of {origin}");
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

/// Drop the credential for `server`, or for the last login when `None`.
fn forget(store: &dyn SecretStore, server: Option<&str>) -> Result<Option<String>> {
    let Some(server) = server else {
        return Ok(secrets::forget_login(store)?);
    };
    let origin = normalize_origin(server)?;
    if !store.remove(TOKEN_SCOPE, &origin)? {
        return Ok(None);
    }
    if store.get(HOST_SCOPE, SAVED_HOST_KEY)?.as_deref() == Some(origin.as_str()) {
        store.remove(HOST_SCOPE, SAVED_HOST_KEY)?;
    }
    Ok(Some(origin))
}
