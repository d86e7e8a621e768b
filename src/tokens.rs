use std::path::PathBuf;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::util;

/// Provider API tokens, kept in their own 0600 file so target
/// configs never carry credentials.
#[derive(Debug, Clone)]
pub struct TokenStore {
    root: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(util::home_dir()?))
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.root.join("tokens.json")
    }

    pub fn load(&self) -> Result<IndexMap<String, String>> {
        let path = self.path();
        if !path.exists() {
            return Ok(IndexMap::new());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed token store, starting empty");
                Ok(IndexMap::new())
            }
        }
    }

    pub fn get(&self, provider: &str) -> Result<Option<String>> {
        Ok(self.load()?.get(provider).cloned())
    }

    /// The token for a provider, or a Validation error telling the
    /// user how to add one.
    pub fn require(&self, provider: &str) -> Result<String> {
        self.get(provider)?.ok_or_else(|| {
            Error::Validation(format!(
                "no API token for '{provider}'. Add one with: lightfold config set-token {provider}"
            ))
        })
    }

    pub fn set(&self, provider: &str, token: &str) -> Result<()> {
        let mut tokens = self.load()?;
        tokens.insert(provider.to_string(), token.to_string());
        self.save(&tokens)
    }

    pub fn delete(&self, provider: &str) -> Result<bool> {
        let mut tokens = self.load()?;
        let removed = tokens.shift_remove(provider).is_some();
        if removed {
            self.save(&tokens)?;
        }
        Ok(removed)
    }

    pub fn providers(&self) -> Result<Vec<String>> {
        Ok(self.load()?.keys().cloned().collect())
    }

    fn save(&self, tokens: &IndexMap<String, String>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(tokens)?;
        util::atomic_write_private(&self.path(), &raw)
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());

        assert_eq!(store.get("hetzner").unwrap(), None);
        store.set("hetzner", "abc123").unwrap();
        assert_eq!(store.get("hetzner").unwrap().as_deref(), Some("abc123"));

        assert!(store.delete("hetzner").unwrap());
        assert!(!store.delete("hetzner").unwrap());
        assert_eq!(store.get("hetzner").unwrap(), None);
    }

    #[test]
    fn require_names_the_fix() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());
        let err = store.require("vultr").unwrap_err();
        assert!(err.to_string().contains("set-token vultr"));
    }

    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().to_path_buf());
        store.set("aws", "secret").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
