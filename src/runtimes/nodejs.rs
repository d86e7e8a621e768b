use crate::error::{Error, Result};
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

/// Pinned major version installed from NodeSource.
pub const NODE_MAJOR: u32 = 20;

pub struct NodejsInstaller;

impl NodejsInstaller {
    fn node_version(ssh: &SshExecutor) -> Result<Option<String>> {
        let out = ssh.execute("node --version 2>/dev/null")?;
        if out.success() && !out.stdout.is_empty() {
            Ok(Some(out.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn pm_present(ssh: &SshExecutor, pm: &str) -> Result<bool> {
        Ok(ssh
            .execute(&format!("command -v {pm} >/dev/null 2>&1"))?
            .success())
    }
}

/// Install steps, in order. Old distro Node is removed before the
/// NodeSource repo is added so apt never resolves to the stale
/// package.
#[must_use]
pub fn install_script(package_manager: Option<&str>) -> Vec<String> {
    let mut steps = vec![
        "apt-get remove -y nodejs npm libnode-dev 2>/dev/null || true".to_string(),
        format!(
            "curl -fsSL https://deb.nodesource.com/setup_{NODE_MAJOR}.x | bash -"
        ),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y nodejs".to_string(),
        "ln -sf \"$(command -v node)\" /usr/bin/node".to_string(),
        "ln -sf \"$(command -v npm)\" /usr/bin/npm".to_string(),
        "ln -sf \"$(command -v npx)\" /usr/bin/npx".to_string(),
    ];
    match package_manager {
        Some("pnpm") => steps.push("corepack enable pnpm && corepack prepare pnpm@latest --activate".to_string()),
        Some("yarn") => steps.push("corepack enable yarn".to_string()),
        Some("bun") => steps.push(
            "command -v bun >/dev/null 2>&1 || (curl -fsSL https://bun.sh/install | BUN_INSTALL=/usr/local bash)"
                .to_string(),
        ),
        _ => {}
    }
    steps
}

impl RuntimeInstaller for NodejsInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Nodejs
    }

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool> {
        let Some(version) = Self::node_version(ssh)? else {
            return Ok(false);
        };
        if !version.starts_with(&format!("v{NODE_MAJOR}.")) {
            return Ok(false);
        }
        match package_manager {
            Some(pm @ ("pnpm" | "yarn" | "bun")) => Self::pm_present(ssh, pm),
            _ => Self::pm_present(ssh, "npm"),
        }
    }

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()> {
        for step in install_script(package_manager) {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("nodejs install: {step}"))?;
        }
        let version = Self::node_version(ssh)?
            .ok_or_else(|| Error::Deployment("node not on PATH after install".into()))?;
        if !version.starts_with(&format!("v{NODE_MAJOR}.")) {
            return Err(Error::Deployment(format!(
                "expected node v{NODE_MAJOR}.x after install, found {version}"
            )));
        }
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &["nodejs"]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec![
            "rm -f /etc/apt/sources.list.d/nodesource.list".to_string(),
            "rm -f /usr/bin/node /usr/bin/npm /usr/bin/npx".to_string(),
            "rm -rf /usr/local/bin/bun".to_string(),
        ]
    }
}
