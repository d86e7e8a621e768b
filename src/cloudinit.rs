/// Sentinel written by first boot; the create phase checks it
/// before re-provisioning.
pub const CREATED_MARKER: &str = "/etc/lightfold/created";

/// Sentinel written after the configure phase finishes.
pub const CONFIGURED_MARKER: &str = "/etc/lightfold/configured";

pub const DEPLOY_USER: &str = "deploy";

const BASE_PACKAGES: &[&str] = &["curl", "ca-certificates", "ufw", "rsync", "git", "tar"];

/// Render the first-boot user-data for a new VM: non-root deploy
/// user with the public key, baseline packages, default-deny
/// firewall with SSH open, and the created marker.
///
/// The script is safe to re-run but only ever meant to run once
/// per machine.
#[must_use]
pub fn build_user_data(public_key: &str) -> String {
    let packages = BASE_PACKAGES
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r"#cloud-config
users:
  - name: {DEPLOY_USER}
    groups: sudo
    shell: /bin/bash
    sudo: ['ALL=(ALL) NOPASSWD:ALL']
    ssh_authorized_keys:
      - {key}

package_update: true
packages:
{packages}

runcmd:
  - mkdir -p /home/{DEPLOY_USER}/.ssh
  - chmod 700 /home/{DEPLOY_USER}/.ssh
  - chmod 600 /home/{DEPLOY_USER}/.ssh/authorized_keys
  - chown -R {DEPLOY_USER}:{DEPLOY_USER} /home/{DEPLOY_USER}/.ssh
  - ufw default deny incoming
  - ufw default allow outgoing
  - ufw allow 22/tcp
  - ufw --force enable
  - mkdir -p /etc/lightfold
  - touch {CREATED_MARKER}
",
        key = public_key.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAITESTKEY user@host";

    #[test]
    fn creates_deploy_user_with_key() {
        let data = build_user_data(KEY);
        assert!(data.starts_with("#cloud-config"));
        assert!(data.contains("name: deploy"));
        assert!(data.contains("NOPASSWD:ALL"));
        assert!(data.contains(KEY));
    }

    #[test]
    fn firewall_defaults_deny_with_ssh_open() {
        let data = build_user_data(KEY);
        assert!(data.contains("ufw default deny incoming"));
        assert!(data.contains("ufw allow 22/tcp"));
        assert!(data.contains("ufw --force enable"));
    }

    #[test]
    fn writes_created_marker() {
        let data = build_user_data(KEY);
        assert!(data.contains("touch /etc/lightfold/created"));
    }

    #[test]
    fn baseline_packages_present() {
        let data = build_user_data(KEY);
        for pkg in ["curl", "ca-certificates", "ufw", "rsync"] {
            assert!(data.contains(&format!("- {pkg}")), "missing {pkg}");
        }
    }

    #[test]
    fn key_is_trimmed() {
        let data = build_user_data("  ssh-ed25519 KEY x@y\n");
        assert!(data.contains("- ssh-ed25519 KEY x@y\n"));
        assert!(!data.contains("KEY x@y\n\n      "));
    }
}
