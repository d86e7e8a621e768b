use std::collections::HashSet;

use crate::runtimes::{Runtime, installer_for};
use crate::server_state::ServerState;
use crate::ssh::SshExecutor;

/// Framework names the detector emits, folded down to the runtime
/// the app needs. Unknown frameworks keep their runtime installed
/// (removal is the risky direction).
#[must_use]
pub fn runtime_for_framework(framework: &str) -> Option<Runtime> {
    match framework {
        "Next.js" | "Nuxt" | "Astro" | "Remix" | "Express" | "Fastify" | "Node.js" => {
            Some(Runtime::Nodejs)
        }
        "Django" | "Flask" | "FastAPI" | "Python" => Some(Runtime::Python),
        "Go" => Some(Runtime::Go),
        "Laravel" | "PHP" => Some(Runtime::Php),
        "Rails" | "Ruby" => Some(Runtime::Ruby),
        "Java" | "Spring" => Some(Runtime::Java),
        "Dockerfile" => Some(Runtime::Docker),
        _ => None,
    }
}

/// Runtimes the remaining apps still depend on. Apps whose
/// framework is unrecognized pin every installed runtime, so a
/// cleaner bug can never strand a running app.
#[must_use]
pub fn required_runtimes(server: &ServerState) -> HashSet<Runtime> {
    let mut required = HashSet::new();
    for app in &server.deployed_apps {
        match runtime_for_framework(&app.framework) {
            Some(runtime) => {
                required.insert(runtime);
            }
            None => {
                return server.installed_runtimes.iter().copied().collect();
            }
        }
    }
    required
}

/// Which installed runtimes nothing needs anymore.
#[must_use]
pub fn orphaned_runtimes(server: &ServerState) -> Vec<Runtime> {
    let required = required_runtimes(server);
    server
        .installed_runtimes
        .iter()
        .copied()
        .filter(|r| !required.contains(r))
        .collect()
}

/// Remove runtimes no remaining app needs: purge packages, run
/// per-runtime cleanup, then autoremove. Best-effort throughout;
/// a failed purge logs a warning and the destroy continues.
/// Returns the runtimes actually dropped from the server state.
pub fn clean_unused_runtimes(ssh: &SshExecutor, server: &mut ServerState) -> Vec<Runtime> {
    let orphans = orphaned_runtimes(server);
    let mut removed = Vec::new();

    for runtime in orphans {
        eprintln!("Removing unused runtime: {runtime}");
        let installer = installer_for(runtime);

        let packages = installer.apt_packages();
        if !packages.is_empty() {
            let purge = format!(
                "DEBIAN_FRONTEND=noninteractive apt-get purge -y {} 2>/dev/null || true",
                packages.join(" ")
            );
            if let Err(e) = ssh.execute_sudo(&purge) {
                tracing::warn!(%runtime, error = %e, "runtime package purge failed");
                continue;
            }
        }

        for command in installer.cleanup_commands() {
            if let Err(e) = ssh.execute_sudo(&command) {
                tracing::warn!(%runtime, command, error = %e, "runtime cleanup command failed");
            }
        }

        server.remove_runtime(runtime);
        removed.push(runtime);
    }

    if !removed.is_empty() {
        if let Err(e) = ssh.execute_sudo("apt-get autoremove -y") {
            tracing::warn!(error = %e, "apt autoremove failed");
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::DeployedApp;

    fn server_with(apps: &[(&str, &str)], runtimes: &[Runtime]) -> ServerState {
        let mut server = ServerState::new("10.0.0.1", "hetzner");
        for (i, (name, framework)) in apps.iter().enumerate() {
            server.register_app(DeployedApp {
                target_name: (*name).to_string(),
                app_name: (*name).to_string(),
                port: 3000 + u16::try_from(i).unwrap(),
                domain: None,
                framework: (*framework).to_string(),
                last_deploy: None,
            });
        }
        for r in runtimes {
            server.add_runtime(*r);
        }
        server
    }

    #[test]
    fn python_orphaned_after_django_app_leaves() {
        let server = server_with(&[("web", "Next.js")], &[Runtime::Nodejs, Runtime::Python]);
        assert_eq!(orphaned_runtimes(&server), vec![Runtime::Python]);
    }

    #[test]
    fn shared_runtime_survives_while_one_user_remains() {
        let server = server_with(
            &[("web", "Next.js"), ("admin", "Express")],
            &[Runtime::Nodejs],
        );
        assert!(orphaned_runtimes(&server).is_empty());
    }

    #[test]
    fn empty_server_orphans_everything() {
        let server = server_with(&[], &[Runtime::Nodejs, Runtime::Docker]);
        let mut orphans = orphaned_runtimes(&server);
        orphans.sort_by_key(|r| r.as_str());
        assert_eq!(orphans, vec![Runtime::Docker, Runtime::Nodejs]);
    }

    #[test]
    fn unknown_framework_pins_all_runtimes() {
        let server = server_with(&[("weird", "Fortran-Web")], &[Runtime::Nodejs]);
        assert!(orphaned_runtimes(&server).is_empty());
    }

    #[test]
    fn framework_mapping_covers_detector_output() {
        assert_eq!(runtime_for_framework("Django"), Some(Runtime::Python));
        assert_eq!(runtime_for_framework("Next.js"), Some(Runtime::Nodejs));
        assert_eq!(runtime_for_framework("Rails"), Some(Runtime::Ruby));
        assert_eq!(runtime_for_framework("Dockerfile"), Some(Runtime::Docker));
        assert_eq!(runtime_for_framework("Unknown"), None);
    }
}
