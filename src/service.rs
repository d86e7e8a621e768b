use std::collections::BTreeMap;

use crate::cloudinit::DEPLOY_USER;
use crate::error::Result;
use crate::ssh::SshExecutor;

/// systemd unit name for an app: dashes become underscores so the
/// name stays a clean identifier.
#[must_use]
pub fn unit_name(app_name: &str) -> String {
    format!("{}.service", app_name.replace('-', "_"))
}

/// Render the unit file that keeps one app running out of its
/// `current` symlink.
#[must_use]
pub fn render_unit(app_name: &str, port: u16, run_command: &str) -> String {
    let app_root = format!("/srv/{app_name}");
    format!(
        r"[Unit]
Description={app_name} (deployed by lightfold)
After=network.target

[Service]
Type=simple
User={DEPLOY_USER}
WorkingDirectory={app_root}/current
EnvironmentFile=-{app_root}/shared/.env
Environment=PORT={port}
ExecStart=/bin/bash -lc '{run_command}'
Restart=always
RestartSec=3
StandardOutput=journal
StandardError=journal

[Install]
WantedBy=multi-user.target
"
    )
}

/// Join a run plan into the single ExecStart command line.
#[must_use]
pub fn run_command(run_plan: &[String]) -> String {
    run_plan.join(" && ")
}

/// Install (or refresh) the unit file and enable the service.
pub fn install_unit(
    ssh: &SshExecutor,
    app_name: &str,
    port: u16,
    run_plan: &[String],
) -> Result<()> {
    let unit = unit_name(app_name);
    let content = render_unit(app_name, port, &run_command(run_plan));
    ssh.write_remote_file(&content, &format!("/etc/systemd/system/{unit}"), Some("644"), None)?;
    ssh.execute_sudo(&format!("systemctl daemon-reload && systemctl enable {unit}"))?
        .expect_success(&format!("enable {unit}"))?;
    Ok(())
}

pub fn restart(ssh: &SshExecutor, app_name: &str) -> Result<()> {
    let unit = unit_name(app_name);
    ssh.execute_sudo(&format!("systemctl restart {unit}"))?
        .expect_success(&format!("restart {unit}"))?;
    Ok(())
}

pub fn stop_and_disable(ssh: &SshExecutor, app_name: &str) -> Result<()> {
    let unit = unit_name(app_name);
    // Missing units are fine; destroy must not trip over a host
    // that never finished configuring.
    let _ = ssh.execute_sudo(&format!("systemctl disable --now {unit}"));
    let _ = ssh.execute_sudo(&format!(
        "rm -f /etc/systemd/system/{unit} && systemctl daemon-reload"
    ));
    Ok(())
}

/// Tail the app's journal; follows when `follow` is set.
pub fn logs(ssh: &SshExecutor, app_name: &str, lines: u32, follow: bool) -> Result<()> {
    let unit = unit_name(app_name);
    let follow_flag = if follow { " -f" } else { "" };
    ssh.execute_interactive(&format!(
        "sudo -n journalctl -u {unit} -n {lines} --no-pager{follow_flag}"
    ))
}

/// Environment block rendered into `shared/.env`.
#[must_use]
pub fn render_env_file(env_vars: &BTreeMap<String, String>, port: u16) -> String {
    let mut out = String::new();
    out.push_str(&format!("PORT={port}\n"));
    for (key, value) in env_vars {
        if key == "PORT" {
            continue;
        }
        if value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
            out.push_str(&format!("{key}={:?}\n", value));
        } else {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}
