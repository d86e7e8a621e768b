use crate::error::{Error, Result};
use crate::ssh::SshExecutor;

/// UFW-backed firewall control on the managed host. Every
/// operation is idempotent; closing a rule that never existed is
/// not an error.
pub struct FirewallManager<'a> {
    ssh: &'a SshExecutor,
}

impl<'a> FirewallManager<'a> {
    #[must_use]
    pub const fn new(ssh: &'a SshExecutor) -> Self {
        Self { ssh }
    }

    fn check_port(port: u16) -> Result<()> {
        if port == 0 {
            return Err(Error::Validation("port must be in 1-65535".into()));
        }
        Ok(())
    }

    pub fn open_port(&self, port: u16) -> Result<()> {
        Self::check_port(port)?;
        self.ssh
            .execute_sudo(&format!("ufw allow {port}/tcp"))?
            .expect_success(&format!("open port {port}"))?;
        Ok(())
    }

    pub fn close_port(&self, port: u16) -> Result<()> {
        Self::check_port(port)?;
        // `ufw delete` on a missing rule reports "Could not delete"
        // on stdout but exits zero; both shapes are fine.
        let out = self.ssh.execute_sudo(&format!("ufw delete allow {port}/tcp"))?;
        if !out.success() && !out.stderr.to_lowercase().contains("could not delete") {
            return Err(Error::Ssh(format!(
                "close port {port} exited {}: {}",
                out.exit_code, out.stderr
            )));
        }
        Ok(())
    }

    pub fn is_port_open(&self, port: u16) -> Result<bool> {
        Self::check_port(port)?;
        Ok(self.list_open_ports()?.contains(&port))
    }

    pub fn list_open_ports(&self) -> Result<Vec<u16>> {
        let out = self
            .ssh
            .execute_sudo("ufw status")?
            .expect_success("ufw status")?;
        Ok(parse_ufw_status(&out.stdout))
    }
}

/// Pull the allowed TCP ports out of `ufw status` output.
#[must_use]
pub fn parse_ufw_status(output: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let Some(rule) = fields.next() else { continue };
        let Some(action) = fields.next() else { continue };
        if action != "ALLOW" {
            continue;
        }
        let spec = rule.strip_suffix("/tcp").unwrap_or(rule);
        if let Ok(port) = spec.parse::<u16>() {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "\
Status: active

To                         Action      From
--                         ------      ----
22/tcp                     ALLOW       Anywhere
80/tcp                     ALLOW       Anywhere
3000/tcp                   ALLOW       Anywhere
443                        ALLOW       Anywhere
22/tcp (v6)                ALLOW       Anywhere (v6)
8080/tcp                   DENY        Anywhere
";

    #[test]
    fn parses_allowed_tcp_ports() {
        let ports = parse_ufw_status(STATUS);
        assert_eq!(ports, vec![22, 80, 3000, 443]);
    }

    #[test]
    fn inactive_status_has_no_ports() {
        assert!(parse_ufw_status("Status: inactive\n").is_empty());
    }
}
