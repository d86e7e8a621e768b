use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util;

/// Per-target lifecycle flags, created lazily on first write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    /// Release directory name, `YYYYMMDDHHMMSS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_deploy: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_id: Option<String>,
    #[serde(default)]
    pub ssl_configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_ssl_renewal: Option<DateTime<Utc>>,
    #[serde(default)]
    pub push_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_failure_reason: Option<String>,
}

/// Store of `state/<target>.json` files.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(util::home_dir()?))
    }

    #[must_use]
    pub fn path(&self, target: &str) -> PathBuf {
        self.root.join("state").join(format!("{target}.json"))
    }

    pub fn load(&self, target: &str) -> Result<TargetState> {
        let path = self.path(target);
        if !path.exists() {
            return Ok(TargetState::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::State(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::State(format!("parse {}: {e}", path.display())))
    }

    pub fn save(&self, target: &str, state: &TargetState) -> Result<()> {
        let raw = serde_json::to_vec_pretty(state)?;
        util::atomic_write(&self.path(target), &raw)
    }

    /// Read-modify-write helper; creates the state file on first
    /// use.
    pub fn update(
        &self,
        target: &str,
        mutate: impl FnOnce(&mut TargetState),
    ) -> Result<TargetState> {
        let mut state = self.load(target)?;
        mutate(&mut state);
        self.save(target, &state)?;
        Ok(state)
    }

    pub fn mark_created(&self, target: &str, provisioned_id: Option<&str>) -> Result<()> {
        self.update(target, |s| {
            s.created = true;
            s.provisioned_id = provisioned_id.map(ToString::to_string);
        })?;
        Ok(())
    }

    pub fn mark_configured(&self, target: &str) -> Result<()> {
        self.update(target, |s| s.configured = true)?;
        Ok(())
    }

    pub fn record_push(&self, target: &str, commit: Option<&str>, release: &str) -> Result<()> {
        self.update(target, |s| {
            s.last_commit = commit.map(ToString::to_string);
            s.last_release = Some(release.to_string());
            s.last_deploy = Some(Utc::now());
            s.push_failed = false;
            s.push_failure_reason = None;
        })?;
        Ok(())
    }

    pub fn record_push_failure(&self, target: &str, reason: &str) -> Result<()> {
        self.update(target, |s| {
            s.push_failed = true;
            s.push_failure_reason = Some(reason.to_string());
        })?;
        Ok(())
    }

    pub fn delete(&self, target: &str) -> Result<()> {
        let path = self.path(target);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| Error::State(format!("remove {}: {e}", path.display())))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn exists(&self, target: &str) -> bool {
        self.path(target).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let state = store.load("web").unwrap();
        assert_eq!(state, TargetState::default());
        assert!(!store.exists("web"));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());

        store.mark_created("web", Some("d-123")).unwrap();
        store.mark_configured("web").unwrap();
        store
            .record_push("web", Some("abc123"), "20250101000000")
            .unwrap();

        let state = store.load("web").unwrap();
        assert!(state.created && state.configured);
        assert_eq!(state.provisioned_id.as_deref(), Some("d-123"));
        assert_eq!(state.last_release.as_deref(), Some("20250101000000"));
        assert!(!state.push_failed);
        assert!(state.last_deploy.is_some());
    }

    #[test]
    fn push_failure_sets_reason_and_success_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());

        store.record_push_failure("web", "health check failed").unwrap();
        let state = store.load("web").unwrap();
        assert!(state.push_failed);
        assert_eq!(state.push_failure_reason.as_deref(), Some("health check failed"));

        store.record_push("web", None, "20250102000000").unwrap();
        let state = store.load("web").unwrap();
        assert!(!state.push_failed);
        assert_eq!(state.push_failure_reason, None);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        store.mark_created("web", None).unwrap();
        store.delete("web").unwrap();
        store.delete("web").unwrap();
        assert!(!store.exists("web"));
    }
}
