use crate::error::Result;
use crate::proxy::{ProxyConfig, ProxyManager, routable};
use crate::ssh::SshExecutor;

const SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
const SITES_ENABLED: &str = "/etc/nginx/sites-enabled";

pub struct Nginx;

/// Render one nginx site.
///
/// With a domain the site routes by `server_name`; without one (a
/// single-app server) it catches everything on :80 so the bare IP
/// works in a browser.
#[must_use]
pub fn render_site(config: &ProxyConfig) -> String {
    let upstream = format!("http://127.0.0.1:{}", config.port);
    let proxy_block = format!(
        "    location / {{\n\
         \x20       proxy_pass {upstream};\n\
         \x20       proxy_http_version 1.1;\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Real-IP $remote_addr;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20       proxy_set_header Upgrade $http_upgrade;\n\
         \x20       proxy_set_header Connection \"upgrade\";\n\
         \x20   }}\n"
    );

    match (&config.domain, config.ssl_enabled) {
        (Some(domain), true) => format!(
            "server {{\n\
             \x20   listen 80;\n\
             \x20   server_name {domain};\n\
             \x20   return 301 https://$host$request_uri;\n\
             }}\n\
             \n\
             server {{\n\
             \x20   listen 443 ssl;\n\
             \x20   server_name {domain};\n\
             \x20   ssl_certificate {cert};\n\
             \x20   ssl_certificate_key {key};\n\
             {proxy_block}\
             }}\n",
            cert = config.ssl_cert_path,
            key = config.ssl_key_path,
        ),
        (Some(domain), false) => format!(
            "server {{\n\
             \x20   listen 80;\n\
             \x20   server_name {domain};\n\
             {proxy_block}\
             }}\n"
        ),
        (None, _) => format!(
            "server {{\n\
             \x20   listen 80 default_server;\n\
             \x20   server_name _;\n\
             {proxy_block}\
             }}\n"
        ),
    }
}

impl Nginx {
    /// Stage, enable, validate. On a failed validation the new
    /// site is rolled back (previous content restored or the site
    /// removed) so nginx never keeps serving a broken config.
    fn write_site(&self, ssh: &SshExecutor, config: &ProxyConfig) -> Result<()> {
        let app = &config.app_name;
        let available = self.config_path(app);
        let enabled = format!("{SITES_ENABLED}/{app}.conf");
        let backup = format!("{available}.bak");
        let staged = format!("{available}.new");

        ssh.write_remote_file(&render_site(config), &staged, Some("644"), None)?;

        let swap = format!(
            "if [ -f {available} ]; then cp {available} {backup}; fi && \
             mv {staged} {available} && \
             ln -sf {available} {enabled} && \
             rm -f {SITES_ENABLED}/default"
        );
        ssh.execute_sudo(&swap)?.expect_success("stage nginx site")?;

        let check = ssh.execute_sudo("nginx -t")?;
        if !check.success() {
            let restore = format!(
                "if [ -f {backup} ]; then mv {backup} {available}; \
                 else rm -f {available} {enabled}; fi"
            );
            let _ = ssh.execute_sudo(&restore);
            return Err(crate::error::Error::Deployment(format!(
                "nginx rejected site for {app}: {}",
                check.stderr
            )));
        }
        let _ = ssh.execute_sudo(&format!("rm -f {backup}"));
        Ok(())
    }
}

impl ProxyManager for Nginx {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn is_available(&self, ssh: &SshExecutor) -> Result<bool> {
        Ok(ssh.execute("command -v nginx >/dev/null 2>&1")?.success())
    }

    fn install(&self, ssh: &SshExecutor) -> Result<()> {
        ssh.execute_sudo(
            "DEBIAN_FRONTEND=noninteractive apt-get update -qq && \
             DEBIAN_FRONTEND=noninteractive apt-get install -y nginx && \
             systemctl enable --now nginx",
        )?
        .expect_success("install nginx")?;
        Ok(())
    }

    fn configure(&self, ssh: &SshExecutor, config: &ProxyConfig) -> Result<()> {
        self.write_site(ssh, config)?;
        self.reload(ssh)
    }

    fn configure_multi_app(&self, ssh: &SshExecutor, configs: &[ProxyConfig]) -> Result<()> {
        for config in routable(configs) {
            self.write_site(ssh, config)?;
        }
        self.reload(ssh)
    }

    fn reload(&self, ssh: &SshExecutor) -> Result<()> {
        ssh.execute_sudo("systemctl reload nginx")?
            .expect_success("reload nginx")?;
        Ok(())
    }

    fn remove(&self, ssh: &SshExecutor, app_name: &str) -> Result<()> {
        let available = self.config_path(app_name);
        let enabled = format!("{SITES_ENABLED}/{app_name}.conf");
        ssh.execute_sudo(&format!("rm -f {available} {enabled}"))?
            .expect_success("remove nginx site")?;
        self.reload(ssh)
    }

    fn config_path(&self, app_name: &str) -> String {
        format!("{SITES_AVAILABLE}/{app_name}.conf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_site_routes_by_server_name() {
        let config = ProxyConfig::new("web", 3000).with_domain("web.example.com");
        let site = render_site(&config);
        assert!(site.contains("server_name web.example.com;"));
        assert!(site.contains("proxy_pass http://127.0.0.1:3000;"));
        assert!(!site.contains("443"));
    }

    #[test]
    fn ssl_site_redirects_http() {
        let config = ProxyConfig::new("web", 3000)
            .with_domain("web.example.com")
            .with_ssl(
                "/etc/letsencrypt/live/web.example.com/fullchain.pem",
                "/etc/letsencrypt/live/web.example.com/privkey.pem",
            );
        let site = render_site(&config);
        assert!(site.contains("return 301 https://$host$request_uri;"));
        assert!(site.contains("listen 443 ssl;"));
        assert!(site.contains("ssl_certificate /etc/letsencrypt/live/web.example.com/fullchain.pem;"));
    }

    #[test]
    fn domainless_site_is_default_server() {
        let site = render_site(&ProxyConfig::new("web", 3000));
        assert!(site.contains("listen 80 default_server;"));
        assert!(site.contains("server_name _;"));
    }

    #[test]
    fn websocket_headers_always_present() {
        let site = render_site(&ProxyConfig::new("web", 3000));
        assert!(site.contains("proxy_set_header Upgrade $http_upgrade;"));
        assert!(site.contains("proxy_set_header Connection \"upgrade\";"));
    }

    #[test]
    fn config_path_per_app() {
        assert_eq!(
            Nginx.config_path("api"),
            "/etc/nginx/sites-available/api.conf"
        );
    }
}
