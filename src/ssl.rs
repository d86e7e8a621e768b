use chrono::Utc;

use crate::error::{Error, Result};
use crate::ssh::SshExecutor;
use crate::state::StateStore;

/// Where an issued certificate landed on the server.
#[derive(Debug, Clone, Default)]
pub struct CertPaths {
    pub cert: String,
    pub key: String,
}

/// ACME certificate issuance on the managed host.
pub trait SslManager {
    fn name(&self) -> &'static str;

    fn issue_certificate(&self, ssh: &SshExecutor, domain: &str, email: &str)
    -> Result<CertPaths>;

    fn enable_auto_renewal(&self, ssh: &SshExecutor) -> Result<()>;
}

pub fn ssl_for(name: &str) -> Result<Box<dyn SslManager>> {
    match name {
        "" | "certbot" => Ok(Box::new(Certbot)),
        "caddy" => Ok(Box::new(CaddyAcme)),
        other => Err(Error::Validation(format!(
            "unknown SSL manager '{other}' (expected certbot or caddy)"
        ))),
    }
}

/// certbot with the nginx authenticator; certificates land under
/// /etc/letsencrypt/live/.
pub struct Certbot;

impl Certbot {
    fn ensure_installed(ssh: &SshExecutor) -> Result<()> {
        if ssh.execute("command -v certbot >/dev/null 2>&1")?.success() {
            return Ok(());
        }
        ssh.execute_sudo(
            "DEBIAN_FRONTEND=noninteractive apt-get update -qq && \
             DEBIAN_FRONTEND=noninteractive apt-get install -y certbot python3-certbot-nginx",
        )?
        .expect_success("install certbot")?;
        Ok(())
    }
}

impl SslManager for Certbot {
    fn name(&self) -> &'static str {
        "certbot"
    }

    fn issue_certificate(
        &self,
        ssh: &SshExecutor,
        domain: &str,
        email: &str,
    ) -> Result<CertPaths> {
        Self::ensure_installed(ssh)?;
        ssh.execute_sudo(&format!(
            "certbot certonly --nginx -d {domain} -m {email} --agree-tos --non-interactive --keep-until-expiring"
        ))?
        .expect_success(&format!("issue certificate for {domain}"))?;

        Ok(CertPaths {
            cert: format!("/etc/letsencrypt/live/{domain}/fullchain.pem"),
            key: format!("/etc/letsencrypt/live/{domain}/privkey.pem"),
        })
    }

    fn enable_auto_renewal(&self, ssh: &SshExecutor) -> Result<()> {
        ssh.execute_sudo("systemctl enable --now certbot.timer")?
            .expect_success("enable certbot renewal timer")?;
        Ok(())
    }
}

/// Caddy issues and renews its own certificates; both operations
/// just confirm the daemon is running.
pub struct CaddyAcme;

impl SslManager for CaddyAcme {
    fn name(&self) -> &'static str {
        "caddy"
    }

    fn issue_certificate(
        &self,
        ssh: &SshExecutor,
        domain: &str,
        _email: &str,
    ) -> Result<CertPaths> {
        ssh.execute_sudo("systemctl is-active caddy")?
            .expect_success(&format!("caddy not running; cannot serve TLS for {domain}"))?;
        Ok(CertPaths::default())
    }

    fn enable_auto_renewal(&self, _ssh: &SshExecutor) -> Result<()> {
        Ok(())
    }
}

/// Record issuance on the target state; best-effort per the state
/// write policy.
pub fn record_issued(states: &StateStore, target: &str) {
    let result = states.update(target, |s| {
        s.ssl_configured = true;
        s.last_ssl_renewal = Some(Utc::now());
    });
    if let Err(e) = result {
        tracing::warn!(target, error = %e, "failed to record SSL state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_defaults_to_certbot() {
        assert_eq!(ssl_for("").unwrap().name(), "certbot");
        assert_eq!(ssl_for("caddy").unwrap().name(), "caddy");
        assert!(ssl_for("acme.sh").is_err());
    }
}
