use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

/// Toolchain version fetched from go.dev when the distro has none.
pub const GO_VERSION: &str = "1.22.5";

pub struct GoInstaller;

#[must_use]
pub fn install_script() -> Vec<String> {
    vec![
        "rm -rf /usr/local/go".to_string(),
        format!(
            "curl -fsSL https://go.dev/dl/go{GO_VERSION}.linux-amd64.tar.gz | tar -C /usr/local -xz"
        ),
        "ln -sf /usr/local/go/bin/go /usr/local/bin/go".to_string(),
        "ln -sf /usr/local/go/bin/gofmt /usr/local/bin/gofmt".to_string(),
    ]
}

impl RuntimeInstaller for GoInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Go
    }

    fn is_installed(&self, ssh: &SshExecutor, _package_manager: Option<&str>) -> Result<bool> {
        Ok(ssh.execute("go version 2>/dev/null")?.success())
    }

    fn install(&self, ssh: &SshExecutor, _package_manager: Option<&str>) -> Result<()> {
        for step in install_script() {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("go install: {step}"))?;
        }
        ssh.execute("go version")?.expect_success("go toolchain check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        // The toolchain lives under /usr/local, not apt.
        &[]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec![
            "rm -rf /usr/local/go".to_string(),
            "rm -f /usr/local/bin/go /usr/local/bin/gofmt".to_string(),
            "rm -rf /home/deploy/go".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_any_prior_toolchain() {
        let steps = install_script();
        assert_eq!(steps[0], "rm -rf /usr/local/go");
        assert!(steps[1].contains(GO_VERSION));
    }

    #[test]
    fn go_ends_up_on_path() {
        assert!(install_script()
            .iter()
            .any(|s| s.contains("/usr/local/bin/go")));
    }
}
