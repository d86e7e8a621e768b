use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

pub struct JavaInstaller;

#[must_use]
pub fn install_script(package_manager: Option<&str>) -> Vec<String> {
    let mut steps = vec![
        "DEBIAN_FRONTEND=noninteractive apt-get update -qq".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y openjdk-17-jdk-headless".to_string(),
    ];
    match package_manager {
        Some("maven") => steps.push(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y maven".to_string(),
        ),
        Some("gradle") => steps.push(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y gradle".to_string(),
        ),
        _ => {}
    }
    steps
}

impl RuntimeInstaller for JavaInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Java
    }

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool> {
        if !ssh.execute("command -v java >/dev/null 2>&1")?.success() {
            return Ok(false);
        }
        match package_manager {
            Some("maven") => Ok(ssh.execute("command -v mvn >/dev/null 2>&1")?.success()),
            Some("gradle") => Ok(ssh.execute("command -v gradle >/dev/null 2>&1")?.success()),
            _ => Ok(true),
        }
    }

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()> {
        for step in install_script(package_manager) {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("java install: {step}"))?;
        }
        ssh.execute("java --version")?.expect_success("java check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &["openjdk-17-jdk-headless", "maven", "gradle"]
    }
}
