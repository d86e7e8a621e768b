use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

pub struct DockerInstaller;

/// The legacy V1 `docker-compose` binary is purged first; builds
/// only ever call the V2 plugin (`docker compose`).
#[must_use]
pub fn install_script() -> Vec<String> {
    vec![
        "apt-get purge -y docker-compose 2>/dev/null || true".to_string(),
        "command -v docker >/dev/null 2>&1 || (curl -fsSL https://get.docker.com | sh)".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y docker-compose-plugin".to_string(),
        "usermod -aG docker deploy".to_string(),
        "systemctl enable --now docker".to_string(),
    ]
}

impl DockerInstaller {
    fn compose_v2_present(ssh: &SshExecutor) -> Result<bool> {
        let out = ssh.execute("docker compose version 2>/dev/null")?;
        Ok(out.success() && out.stdout.contains("Docker Compose version"))
    }
}

impl RuntimeInstaller for DockerInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Docker
    }

    fn is_installed(&self, ssh: &SshExecutor, _package_manager: Option<&str>) -> Result<bool> {
        if !ssh.execute("command -v docker >/dev/null 2>&1")?.success() {
            return Ok(false);
        }
        Self::compose_v2_present(ssh)
    }

    fn install(&self, ssh: &SshExecutor, _package_manager: Option<&str>) -> Result<()> {
        for step in install_script() {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("docker install: {step}"))?;
        }
        ssh.execute("docker compose version")?
            .expect_success("docker compose v2 check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &[
            "docker-ce",
            "docker-ce-cli",
            "containerd.io",
            "docker-buildx-plugin",
            "docker-compose-plugin",
        ]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec![
            "docker system prune -af 2>/dev/null || true".to_string(),
            "rm -rf /var/lib/docker".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purges_v1_compose_first() {
        let steps = install_script();
        assert!(steps[0].contains("purge -y docker-compose"));
    }

    #[test]
    fn installs_v2_plugin_and_grants_deploy_access() {
        let steps = install_script();
        assert!(steps.iter().any(|s| s.contains("docker-compose-plugin")));
        assert!(steps.iter().any(|s| s.contains("usermod -aG docker deploy")));
    }
}
