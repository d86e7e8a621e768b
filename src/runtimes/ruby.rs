use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

pub struct RubyInstaller;

#[must_use]
pub fn install_script(package_manager: Option<&str>) -> Vec<String> {
    let mut steps = vec![
        "DEBIAN_FRONTEND=noninteractive apt-get update -qq".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y ruby-full build-essential libyaml-dev"
            .to_string(),
    ];
    if package_manager.is_none_or(|pm| pm == "bundler") {
        steps.push("gem list -i bundler >/dev/null 2>&1 || gem install bundler".to_string());
    }
    steps
}

impl RuntimeInstaller for RubyInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Ruby
    }

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool> {
        if !ssh.execute("command -v ruby >/dev/null 2>&1")?.success() {
            return Ok(false);
        }
        if package_manager.is_none_or(|pm| pm == "bundler") {
            return Ok(ssh.execute("command -v bundle >/dev/null 2>&1")?.success());
        }
        Ok(true)
    }

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()> {
        for step in install_script(package_manager) {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("ruby install: {step}"))?;
        }
        ssh.execute("ruby --version")?.expect_success("ruby check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &["ruby-full"]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec!["rm -rf /home/deploy/.bundle /home/deploy/.gem".to_string()]
    }
}
