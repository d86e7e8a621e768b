use std::path::{Path, PathBuf};

use crate::cmd;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::util;

pub const DEFAULT_KEY_NAME: &str = "lightfold_ed25519";

/// A local keypair under `~/.lightfold/keys/`.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
}

impl Keypair {
    pub fn public_key(&self) -> Result<String> {
        std::fs::read_to_string(&self.public_path)
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::Config(format!("read {}: {e}", self.public_path.display())))
    }
}

#[must_use]
pub fn keys_dir(root: &Path) -> PathBuf {
    root.join("keys")
}

/// Return the shared deploy keypair, generating it with ssh-keygen
/// on first use. The private key is 0600.
pub fn ensure_keypair(root: &Path) -> Result<Keypair> {
    let dir = keys_dir(root);
    std::fs::create_dir_all(&dir)?;

    let private_path = dir.join(DEFAULT_KEY_NAME);
    let public_path = dir.join(format!("{DEFAULT_KEY_NAME}.pub"));

    if !private_path.exists() {
        eprintln!("Generating ed25519 deploy key...");
        let path_str = private_path.to_string_lossy().to_string();
        cmd::run(
            "ssh-keygen",
            &["-t", "ed25519", "-N", "", "-C", "lightfold-deploy", "-f", &path_str],
        )?;
    }
    if !public_path.exists() {
        return Err(Error::Config(format!(
            "public key missing next to {}",
            private_path.display()
        )));
    }

    util::set_private(&private_path)?;
    Ok(Keypair {
        private_path,
        public_path,
    })
}

/// Delete private keys no remaining target references. The shared
/// default key survives while any target exists at all.
pub fn remove_unused_keys(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let dir = keys_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut referenced: Vec<PathBuf> = config
        .targets
        .values()
        .filter_map(|t| t.provider_config.ssh_key())
        .map(PathBuf::from)
        .collect();
    if !config.targets.is_empty() {
        referenced.push(dir.join(DEFAULT_KEY_NAME));
    }

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "pub") {
            continue;
        }
        if referenced.iter().any(|r| r == &path) {
            continue;
        }
        let pub_path = PathBuf::from(format!("{}.pub", path.display()));
        std::fs::remove_file(&path)?;
        if pub_path.exists() {
            std::fs::remove_file(&pub_path)?;
        }
        tracing::debug!(key = %path.display(), "removed unused key");
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ByosConfig, ProviderConfig, Target};

    fn fake_key(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), "PRIVATE").unwrap();
        std::fs::write(dir.join(format!("{name}.pub")), "ssh-ed25519 AAA x").unwrap();
    }

    fn target_with_key(name: &str, key: &Path) -> Target {
        Target {
            name: name.to_string(),
            project_path: PathBuf::from("/tmp/p"),
            framework: String::new(),
            language: String::new(),
            provider_config: ProviderConfig::Byos(ByosConfig {
                ip: "203.0.113.1".to_string(),
                username: "deploy".to_string(),
                ssh_key_path: key.to_string_lossy().to_string(),
            }),
            builder: crate::config::Builder::Native,
            server_ip: String::new(),
            port: 0,
            domain: None,
            deploy_options: None,
        }
    }

    #[test]
    fn unreferenced_keys_are_removed() {
        let root = tempfile::tempdir().unwrap();
        let dir = keys_dir(root.path());
        fake_key(&dir, "lightfold_ed25519");
        fake_key(&dir, "orphan_key");

        let mut config = Config::default();
        let kept = dir.join("lightfold_ed25519");
        config
            .targets
            .insert("web".to_string(), target_with_key("web", &kept));

        let removed = remove_unused_keys(root.path(), &config).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(removed[0].ends_with("orphan_key"));
        assert!(kept.exists());
        assert!(!dir.join("orphan_key").exists());
        assert!(!dir.join("orphan_key.pub").exists());
    }

    #[test]
    fn default_key_survives_while_targets_remain() {
        let root = tempfile::tempdir().unwrap();
        let dir = keys_dir(root.path());
        fake_key(&dir, "lightfold_ed25519");

        let mut config = Config::default();
        let other = dir.join("other");
        fake_key(&dir, "other");
        config
            .targets
            .insert("web".to_string(), target_with_key("web", &other));

        remove_unused_keys(root.path(), &config).unwrap();
        assert!(dir.join("lightfold_ed25519").exists());
    }

    #[test]
    fn everything_removed_when_no_targets() {
        let root = tempfile::tempdir().unwrap();
        let dir = keys_dir(root.path());
        fake_key(&dir, "lightfold_ed25519");

        let removed = remove_unused_keys(root.path(), &Config::default()).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!dir.join("lightfold_ed25519").exists());
    }
}
