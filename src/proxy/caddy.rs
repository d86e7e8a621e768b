use caddyfile_rs::{Caddyfile, SiteBlock, format};

use crate::error::Result;
use crate::proxy::{ProxyConfig, ProxyManager, routable};
use crate::ssh::SshExecutor;

const SITES_DIR: &str = "/etc/caddy/sites";
const MAIN_CADDYFILE: &str = "/etc/caddy/Caddyfile";

pub struct CaddyProxy;

/// Render one Caddy site. Domains get automatic TLS from Caddy's
/// built-in ACME client; domainless single-app servers listen on
/// plain :80.
#[must_use]
pub fn render_site(config: &ProxyConfig) -> String {
    let address = config
        .domain
        .clone()
        .unwrap_or_else(|| ":80".to_string());

    let site = SiteBlock::new(&address)
        .reverse_proxy(&format!("127.0.0.1:{}", config.port))
        .encode_gzip()
        .log();

    format(&Caddyfile::new().site(site))
}

/// The master Caddyfile just pulls in one file per app.
#[must_use]
pub fn render_main() -> String {
    format!("import {SITES_DIR}/*.caddy\n")
}

impl CaddyProxy {
    fn write_site(&self, ssh: &SshExecutor, config: &ProxyConfig) -> Result<()> {
        let path = self.config_path(&config.app_name);
        let backup = format!("{path}.bak");

        ssh.execute_sudo(&format!(
            "mkdir -p {SITES_DIR} && if [ -f {path} ]; then cp {path} {backup}; fi"
        ))?
        .expect_success("prepare caddy sites dir")?;

        ssh.write_remote_file(&render_site(config), &path, Some("644"), None)?;

        let check = ssh.execute_sudo(&format!(
            "caddy validate --config {MAIN_CADDYFILE} --adapter caddyfile"
        ))?;
        if !check.success() {
            let restore = format!(
                "if [ -f {backup} ]; then mv {backup} {path}; else rm -f {path}; fi"
            );
            let _ = ssh.execute_sudo(&restore);
            return Err(crate::error::Error::Deployment(format!(
                "caddy rejected site for {}: {}",
                config.app_name, check.stderr
            )));
        }
        let _ = ssh.execute_sudo(&format!("rm -f {backup}"));
        Ok(())
    }

    fn ensure_main(&self, ssh: &SshExecutor) -> Result<()> {
        let out = ssh.execute(&format!(
            "grep -qs 'import {SITES_DIR}' {MAIN_CADDYFILE}"
        ))?;
        if !out.success() {
            ssh.write_remote_file(&render_main(), MAIN_CADDYFILE, Some("644"), None)?;
        }
        Ok(())
    }
}

impl ProxyManager for CaddyProxy {
    fn name(&self) -> &'static str {
        "caddy"
    }

    fn is_available(&self, ssh: &SshExecutor) -> Result<bool> {
        Ok(ssh.execute("command -v caddy >/dev/null 2>&1")?.success())
    }

    fn install(&self, ssh: &SshExecutor) -> Result<()> {
        ssh.execute_sudo(
            "DEBIAN_FRONTEND=noninteractive apt-get update -qq && \
             DEBIAN_FRONTEND=noninteractive apt-get install -y debian-keyring debian-archive-keyring apt-transport-https curl && \
             curl -1sLf 'https://dl.cloudsmith.io/public/caddy/stable/gpg.key' | gpg --dearmor -o /usr/share/keyrings/caddy-stable-archive-keyring.gpg && \
             curl -1sLf 'https://dl.cloudsmith.io/public/caddy/stable/debian.deb.txt' > /etc/apt/sources.list.d/caddy-stable.list && \
             apt-get update -qq && \
             DEBIAN_FRONTEND=noninteractive apt-get install -y caddy && \
             systemctl enable --now caddy",
        )?
        .expect_success("install caddy")?;
        self.ensure_main(ssh)
    }

    fn configure(&self, ssh: &SshExecutor, config: &ProxyConfig) -> Result<()> {
        self.ensure_main(ssh)?;
        self.write_site(ssh, config)?;
        self.reload(ssh)
    }

    fn configure_multi_app(&self, ssh: &SshExecutor, configs: &[ProxyConfig]) -> Result<()> {
        self.ensure_main(ssh)?;
        for config in routable(configs) {
            self.write_site(ssh, config)?;
        }
        self.reload(ssh)
    }

    fn reload(&self, ssh: &SshExecutor) -> Result<()> {
        ssh.execute_sudo("systemctl reload caddy")?
            .expect_success("reload caddy")?;
        Ok(())
    }

    fn remove(&self, ssh: &SshExecutor, app_name: &str) -> Result<()> {
        ssh.execute_sudo(&format!("rm -f {}", self.config_path(app_name)))?
            .expect_success("remove caddy site")?;
        self.reload(ssh)
    }

    fn config_path(&self, app_name: &str) -> String {
        format!("{SITES_DIR}/{app_name}.caddy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_site_gets_site_address() {
        let config = ProxyConfig::new("web", 3000).with_domain("web.example.com");
        let site = render_site(&config);
        assert!(site.contains("web.example.com {"));
        assert!(site.contains("reverse_proxy 127.0.0.1:3000"));
        assert!(site.contains("encode gzip"));
    }

    #[test]
    fn domainless_site_listens_on_port_80() {
        let site = render_site(&ProxyConfig::new("web", 3000));
        assert!(site.contains(":80 {"));
        assert!(site.contains("reverse_proxy 127.0.0.1:3000"));
    }

    #[test]
    fn main_caddyfile_imports_sites() {
        assert_eq!(render_main(), "import /etc/caddy/sites/*.caddy\n");
    }

    #[test]
    fn config_path_per_app() {
        assert_eq!(CaddyProxy.config_path("api"), "/etc/caddy/sites/api.caddy");
    }
}
