pub mod caddy;
pub mod nginx;

use crate::error::{Error, Result};
use crate::ssh::SshExecutor;

/// Site configuration for one app behind the reverse proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub app_name: String,
    pub port: u16,
    pub domain: Option<String>,
    pub ssl_enabled: bool,
    pub ssl_cert_path: String,
    pub ssl_key_path: String,
}

impl ProxyConfig {
    #[must_use]
    pub fn new(app_name: &str, port: u16) -> Self {
        Self {
            app_name: app_name.to_string(),
            port,
            domain: None,
            ssl_enabled: false,
            ssl_cert_path: String::new(),
            ssl_key_path: String::new(),
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    #[must_use]
    pub fn with_ssl(mut self, cert: &str, key: &str) -> Self {
        self.ssl_enabled = true;
        self.ssl_cert_path = cert.to_string();
        self.ssl_key_path = key.to_string();
        self
    }
}

/// A reverse proxy on the server. Writes are staged through /tmp,
/// validated, and only then reloaded; a bad site file never stays
/// enabled.
pub trait ProxyManager {
    fn name(&self) -> &'static str;

    /// True when the proxy binary is present on the host.
    fn is_available(&self, ssh: &SshExecutor) -> Result<bool>;

    /// Install and enable the proxy package.
    fn install(&self, ssh: &SshExecutor) -> Result<()>;

    /// Write one site and reload.
    fn configure(&self, ssh: &SshExecutor, config: &ProxyConfig) -> Result<()>;

    /// Write one site file per app, then reload once.
    ///
    /// Apps without a domain are skipped when more than one app
    /// shares the server: without host headers the proxy cannot
    /// route them, so they stay reachable at `IP:port` only.
    fn configure_multi_app(&self, ssh: &SshExecutor, configs: &[ProxyConfig]) -> Result<()>;

    fn reload(&self, ssh: &SshExecutor) -> Result<()>;

    /// Drop an app's site and reload.
    fn remove(&self, ssh: &SshExecutor, app_name: &str) -> Result<()>;

    fn config_path(&self, app_name: &str) -> String;
}

/// Name-keyed registry; unknown names fall out as validation
/// errors so a typo in `proxy_type` is caught before SSH work.
pub fn proxy_for(name: &str) -> Result<Box<dyn ProxyManager>> {
    match name {
        "" | "nginx" => Ok(Box::new(nginx::Nginx)),
        "caddy" => Ok(Box::new(caddy::CaddyProxy)),
        other => Err(Error::Validation(format!(
            "unknown proxy type '{other}' (expected nginx or caddy)"
        ))),
    }
}

/// Which configs `configure_multi_app` will actually write sites
/// for, given the multi-app routing constraint.
#[must_use]
pub fn routable<'a>(configs: &'a [ProxyConfig]) -> Vec<&'a ProxyConfig> {
    if configs.len() <= 1 {
        return configs.iter().collect();
    }
    configs.iter().filter(|c| c.domain.is_some()).collect()
}
