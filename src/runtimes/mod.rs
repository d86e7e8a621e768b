pub mod docker;
pub mod golang;
pub mod java;
pub mod nodejs;
pub mod php;
pub mod python;
pub mod ruby;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ssh::SshExecutor;

/// A language execution environment on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    Nodejs,
    Python,
    Go,
    Php,
    Ruby,
    Java,
    Docker,
}

impl Runtime {
    /// Fixed mapping from `Detection.language` to the runtime that
    /// must be present before the app can run.
    #[must_use]
    pub fn for_language(language: &str) -> Option<Self> {
        match language {
            "JavaScript/TypeScript" => Some(Self::Nodejs),
            "Python" => Some(Self::Python),
            "Go" => Some(Self::Go),
            "PHP" => Some(Self::Php),
            "Ruby" => Some(Self::Ruby),
            "Java" => Some(Self::Java),
            "Container" => Some(Self::Docker),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nodejs => "nodejs",
            Self::Python => "python",
            Self::Go => "go",
            Self::Php => "php",
            Self::Ruby => "ruby",
            Self::Java => "java",
            Self::Docker => "docker",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An idempotent installer for one runtime. `install` must
/// converge whether the runtime is absent, partially installed, or
/// present at a newer version; `is_installed` only reports true
/// when the package-manager variant the detection asks for is also
/// usable.
pub trait RuntimeInstaller {
    fn runtime(&self) -> Runtime;

    fn is_installed(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<bool>;

    fn install(&self, ssh: &SshExecutor, package_manager: Option<&str>) -> Result<()>;

    /// APT packages the runtime cleaner purges when no app needs
    /// this runtime anymore.
    fn apt_packages(&self) -> &'static [&'static str];

    /// Extra cleanup commands run before `apt-get autoremove`.
    fn cleanup_commands(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Name-keyed registry, the single place that knows every
/// installer.
#[must_use]
pub fn installer_for(runtime: Runtime) -> Box<dyn RuntimeInstaller> {
    match runtime {
        Runtime::Nodejs => Box::new(nodejs::NodejsInstaller),
        Runtime::Python => Box::new(python::PythonInstaller),
        Runtime::Go => Box::new(golang::GoInstaller),
        Runtime::Php => Box::new(php::PhpInstaller),
        Runtime::Ruby => Box::new(ruby::RubyInstaller),
        Runtime::Java => Box::new(java::JavaInstaller),
        Runtime::Docker => Box::new(docker::DockerInstaller),
    }
}

/// Convenience for code that starts from a `Detection`.
pub fn installer_for_language(language: &str) -> Option<Box<dyn RuntimeInstaller>> {
    Runtime::for_language(language).map(installer_for)
}
