//! Credential storage.
//!
//! Secrets are grouped by scope and key. The file store keeps them at
//! `~/.chatinterface/secrets.toml`:
//!
//! ```toml
//! ["chatinterface.client.local"]
//! saved_host = "https://chat.example.com"
//!
//! ["chatinterface.client.token"]
//! "https://chat.example.com" = "f3c1..."
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chatinterface_core::error::{ChatError, ChatResult};

/// Scope holding client-wide settings.
pub const HOST_SCOPE: &str = "chatinterface.client.local";
/// Key under [`HOST_SCOPE`] naming the last server logged into.
pub const SAVED_HOST_KEY: &str = "saved_host";
/// Scope holding one credential per server origin.
pub const TOKEN_SCOPE: &str = "chatinterface.client.token";

type Scopes = BTreeMap<String, BTreeMap<String, String>>;

pub trait SecretStore: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> ChatResult<Option<String>>;

    fn set(&self, scope: &str, key: &str, value: &str) -> ChatResult<()>;

    /// Returns whether anything was removed.
    fn remove(&self, scope: &str, key: &str) -> ChatResult<bool>;
}

/// Server origin and credential from the last successful login, if both
/// are still stored.
pub fn saved_login(store: &dyn SecretStore) -> ChatResult<Option<(String, String)>> {
    let Some(host) = store.get(HOST_SCOPE, SAVED_HOST_KEY)? else {
        return Ok(None);
    };
    Ok(store.get(TOKEN_SCOPE, &host)?.map(|token| (host, token)))
}

/// Remember `origin` as the default server and `credential` for it.
pub fn save_login(store: &dyn SecretStore, origin: &str, credential: &str) -> ChatResult<()> {
    store.set(TOKEN_SCOPE, origin, credential)?;
    store.set(HOST_SCOPE, SAVED_HOST_KEY, origin)
}

/// Drop the saved login. Returns the origin that was forgotten.
pub fn forget_login(store: &dyn SecretStore) -> ChatResult<Option<String>> {
    let Some(host) = store.get(HOST_SCOPE, SAVED_HOST_KEY)? else {
        return Ok(None);
    };
    store.remove(TOKEN_SCOPE, &host)?;
    store.remove(HOST_SCOPE, SAVED_HOST_KEY)?;
    Ok(Some(host))
}

/// TOML-file backed store, readable only by the owner.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.chatinterface/secrets.toml`
    pub fn default_location() -> ChatResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ChatError::Other("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".chatinterface").join("secrets.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ChatResult<Scopes> {
        if !self.path.exists() {
            return Ok(Scopes::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            ChatError::Other(format!("corrupt secret store {}: {e}", self.path.display()))
        })
    }

    fn save(&self, scopes: &Scopes) -> ChatResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
                }
            }
        }

        let content = toml::to_string(scopes).map_err(|e| ChatError::Other(e.to_string()))?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, scope: &str, key: &str) -> ChatResult<Option<String>> {
        Ok(self
            .load()?
            .get(scope)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> ChatResult<()> {
        let mut scopes = self.load()?;
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save(&scopes)
    }

    fn remove(&self, scope: &str, key: &str) -> ChatResult<bool> {
        let mut scopes = self.load()?;
        let Some(entries) = scopes.get_mut(scope) else {
            return Ok(false);
        };
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        if entries.is_empty() {
            scopes.remove(scope);
        }
        self.save(&scopes)?;
        Ok(true)
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemorySecretStore {
    scopes: Mutex<Scopes>,
}

impl MemorySecretStore {
    fn scopes(&self) -> ChatResult<std::sync::MutexGuard<'_, Scopes>> {
        self.scopes
            .lock()
            .map_err(|_| ChatError::Other("secret store lock poisoned".into()))
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, scope: &str, key: &str) -> ChatResult<Option<String>> {
        Ok(self.scopes()?.get(scope).and_then(|e| e.get(key)).cloned())
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> ChatResult<()> {
        self.scopes()?
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> ChatResult<bool> {
        Ok(self
            .scopes()?
            .get_mut(scope)
            .and_then(|e| e.remove(key))
            .is_some())
    }
}
