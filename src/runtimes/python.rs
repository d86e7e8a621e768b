use crate::error::Result;
use crate::runtimes::{Runtime, RuntimeInstaller};
use crate::ssh::SshExecutor;

pub struct PythonInstaller;

impl PythonInstaller {
    fn variant_present(ssh: &SshExecutor, pm: &str) -> Result<bool> {
        Ok(ssh
            .execute(&format!("command -v {pm} >/dev/null 2>&1"))?
            .success())
    }
}

#[must_use]
pub fn install_script(package_manager: Option<&str>) -> Vec<String> {
    let mut steps = vec![
        "DEBIAN_FRONTEND=noninteractive apt-get update -qq".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -y python3 python3-pip python3-venv python3-dev build-essential"
            .to_string(),
        // Downstream builders invoke bare `python` and `pip`.
        "ln -sf \"$(command -v python3)\" /usr/bin/python".to_string(),
        "ln -sf \"$(command -v pip3)\" /usr/bin/pip".to_string(),
    ];
    match package_manager {
        Some("poetry") => steps.push(
            "command -v poetry >/dev/null 2>&1 || (curl -sSL https://install.python-poetry.org | POETRY_HOME=/usr/local/poetry python3 - && ln -sf /usr/local/poetry/bin/poetry /usr/local/bin/poetry)"
                .to_string(),
        ),
        Some("uv") => steps.push(
            "command -v uv >/dev/null 2>&1 || (curl -LsSf https://astral.sh/uv/install.sh | UV_INSTALL_DIR=/usr/local/bin sh)"
                .to_string(),
        ),
        Some("pipenv") => steps.push("pip install --break-system-packages pipenv".to_string()),
        _ => {}
    }
    steps
}

impl RuntimeInstaller for PythonInstaller {
    fn runtime(&self) -> Runtime {
        Runtime::Python
    }

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool> {
        if !ssh.execute("command -v python3 >/dev/null 2>&1")?.success() {
            return Ok(false);
        }
        match package_manager {
            Some(pm @ ("poetry" | "uv" | "pipenv")) => Self::variant_present(ssh, pm),
            _ => Self::variant_present(ssh, "pip3"),
        }
    }

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()> {
        for step in install_script(package_manager) {
            ssh.execute_sudo(&step)?
                .expect_success(&format!("python install: {step}"))?;
        }

        // A python3 without ensurepip (minimal images) breaks venv
        // creation in build plans.
        ssh.execute("python3 -c 'import ensurepip'")?
            .expect_success("python ensurepip check")?;

        ssh.execute("python --version")?
            .expect_success("python symlink check")?;
        Ok(())
    }

    fn apt_packages(&self) -> &'static [&'static str] {
        &["python3-pip", "python3-venv", "python3-dev"]
    }

    fn cleanup_commands(&self) -> Vec<String> {
        vec![
            "rm -f /usr/bin/python /usr/bin/pip".to_string(),
            "rm -rf /usr/local/poetry /usr/local/bin/poetry".to_string(),
            "rm -f /usr/local/bin/uv /usr/local/bin/uvx".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_includes_venv_and_pip() {
        let steps = install_script(None);
        assert!(steps.iter().any(|s| s.contains("python3-venv")));
        assert!(steps.iter().any(|s| s.contains("python3-pip")));
    }

    #[test]
    fn bare_python_and_pip_symlinks() {
        let steps = install_script(None);
        assert!(steps.iter().any(|s| s.contains("/usr/bin/python")));
        assert!(steps.iter().any(|s| s.contains("/usr/bin/pip")));
    }

    #[test]
    fn poetry_variant_adds_installer() {
        let steps = install_script(Some("poetry"));
        assert!(steps.iter().any(|s| s.contains("install.python-poetry.org")));
        assert!(install_script(None)
            .iter()
            .all(|s| !s.contains("poetry")));
    }

    #[test]
    fn uv_variant_adds_installer() {
        let steps = install_script(Some("uv"));
        assert!(steps.iter().any(|s| s.contains("astral.sh/uv")));
    }
}
