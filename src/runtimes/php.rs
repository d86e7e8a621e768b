use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

pub struct PhpInstaller;

#[must_use]
pub fn install_script(package_manager: Option<&str>) -> Vec<String> {
    let mut steps = vec![
        "DEBIAN_FRONTEND=noninteractive apt-get update -qq".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y php-fpm php-cli php-mbstring php-xml php-curl php-zip unzip"
            .to_string(),
    ];
    if package_manager.is_none_or(|pm| pm == "composer") {
        steps.push(
            "command -v composer >/dev/null 2>&1 || (curl -sS https://getcomposer.org/installer | php -- --install-dir=/usr/local/bin --filename=composer)"
                .to_string(),
        );
    }
    steps
}

impl RuntimeInstaller for PhpInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Php
    }

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool> {
        if !ssh.execute("command -v php >/dev/null 2>&1")?.success() {
            return Ok(false);
        }
        if package_manager.is_none_or(|pm| pm == "composer") {
            return Ok(ssh.execute("command -v composer >/dev/null 2>&1")?.success());
        }
        Ok(true)
    }

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()> {
        for step in install_script(package_manager) {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("php install: {step}"))?;
        }
        ssh.execute("php --version")?.expect_success("php check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &["php-fpm", "php-cli", "php-mbstring", "php-xml", "php-curl", "php-zip"]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec!["rm -f /usr/local/bin/composer".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composer_installed_by_default() {
        assert!(install_script(None)
            .iter()
            .any(|s| s.contains("getcomposer.org")));
    }

    #[test]
    fn fpm_present_for_proxy_handoff() {
        assert!(install_script(Some("composer"))
            .iter()
            .any(|s| s.contains("php-fpm")));
    }
}
