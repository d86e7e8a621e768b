use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::{Orchestrator, TargetSpec};
use crate::ssh::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY};
use crate::util;

#[derive(Parser)]
#[command(name = "lightfold")]
#[command(about = "Deploy web apps to your own servers", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Operate on a named target instead of resolving by path
    #[arg(long, global = true)]
    target: Option<String>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Never prompt; fail when input would be needed
    #[arg(long, global = true)]
    no_interactive: bool,

    /// Re-run phases even when cached state says they are done
    #[arg(long, global = true)]
    force: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the project's language, framework, and plans
    Detect {
        /// Project directory (defaults to the working directory)
        path: Option<PathBuf>,
    },

    /// Create infrastructure for a target
    Create {
        path: Option<PathBuf>,

        #[arg(long)]
        provider: Option<String>,

        /// Cloud region / location
        #[arg(long)]
        region: Option<String>,

        /// Instance size / plan / type
        #[arg(long)]
        size: Option<String>,

        /// OS image (provider-specific identifier)
        #[arg(long)]
        image: Option<String>,

        /// Existing server address (byos)
        #[arg(long)]
        ip: Option<String>,

        /// SSH username on an existing server (byos)
        #[arg(long)]
        username: Option<String>,

        /// Bucket name (s3)
        #[arg(long)]
        bucket: Option<String>,

        /// Domain to route to this app
        #[arg(long)]
        domain: Option<String>,

        /// Reverse proxy flavor (nginx or caddy)
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Install runtime, proxy, and app layout on the server
    Configure {
        path: Option<PathBuf>,
    },

    /// Ship a release (tarball, build, atomic activate, health check)
    Push {
        path: Option<PathBuf>,
    },

    /// Full pipeline: detect, create, configure, push
    Deploy {
        path: Option<PathBuf>,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        size: Option<String>,

        #[arg(long)]
        image: Option<String>,

        #[arg(long)]
        ip: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        bucket: Option<String>,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long)]
        proxy: Option<String>,
    },

    /// Point `current` back at the previous release
    Rollback {
        path: Option<PathBuf>,
    },

    /// Remove a target (and its server when nothing else uses it)
    Destroy {
        path: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show a target's deployment state
    Status {
        path: Option<PathBuf>,
    },

    /// Reconcile local state with the server
    Sync {
        path: Option<PathBuf>,
    },

    /// Tail the app's service journal
    Logs {
        path: Option<PathBuf>,

        #[arg(short = 'n', long, default_value_t = 100)]
        lines: u32,

        #[arg(short, long)]
        follow: bool,
    },

    /// Open an interactive shell on the target's server
    Ssh {
        path: Option<PathBuf>,
    },

    /// Manage the domain attached to a target
    Domain {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Inspect managed servers
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Tokens and global options
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DomainAction {
    /// Attach a domain, configure the proxy, issue a certificate
    Add {
        domain: String,

        /// Contact email for the ACME account
        #[arg(long)]
        email: Option<String>,

        /// certbot or caddy
        #[arg(long, default_value = "certbot")]
        ssl_manager: String,

        path: Option<PathBuf>,
    },
    /// Detach the domain and fall back to port routing
    Remove {
        path: Option<PathBuf>,
    },
    /// Show the domain configuration
    Show {
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    /// All servers with their apps and runtimes
    List,
    /// One server by IP
    Show { ip: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show global options and configured targets
    List,
    /// Store a provider API token (prompts when omitted)
    SetToken {
        provider: String,
        token: Option<String>,
    },
    /// Print whether a token is stored for a provider
    GetToken { provider: String },
    /// Remove a provider token
    DeleteToken { provider: String },
    /// How many releases to keep per app
    SetKeepReleases { count: usize },
}

/// Parse arguments and run the selected command. Non-zero exit on
/// any failure; a skipped phase still exits zero.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let orch = Orchestrator::open(!cli.no_interactive, cli.force)?;
    let mut config = orch.configs.load()?;

    match cli.command {
        Command::Detect { path } => {
            let (_, project) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let detection = orch.detect(&project)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&detection)?);
            } else {
                eprintln!("Framework: {}", detection.framework);
                eprintln!("Language:  {}", detection.language);
                eprintln!("Build:     {}", detection.build_plan.join(" && "));
                eprintln!("Run:       {}", detection.run_plan.join(" && "));
                if let Some(pm) = detection.package_manager() {
                    eprintln!("Packages:  {pm}");
                }
            }
            Ok(())
        }

        Command::Create {
            path,
            provider,
            region,
            size,
            image,
            ip,
            username,
            bucket,
            domain,
            proxy,
        } => {
            let (name, project) =
                orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let detection = orch.detect(&project)?;
            let spec = TargetSpec {
                provider,
                region,
                size,
                image,
                ip,
                username,
                bucket,
                domain,
                proxy,
            };
            orch.ensure_target(&mut config, &name, &project, &spec, &detection)?;
            orch.create(&mut config, &name)?;
            Ok(())
        }

        Command::Configure { path } => {
            let (name, project) =
                orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let detection = orch.detect(&project)?;
            orch.configure(&mut config, &name, &detection)?;
            Ok(())
        }

        Command::Push { path } => {
            let (name, project) =
                orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let detection = orch.detect(&project)?;
            orch.push(&mut config, &name, &detection)?;
            Ok(())
        }

        Command::Deploy {
            path,
            provider,
            region,
            size,
            image,
            ip,
            username,
            bucket,
            domain,
            proxy,
        } => {
            let (name, project) =
                orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let detection = orch.detect(&project)?;
            let spec = TargetSpec {
                provider,
                region,
                size,
                image,
                ip,
                username,
                bucket,
                domain,
                proxy,
            };
            orch.ensure_target(&mut config, &name, &project, &spec, &detection)?;
            orch.deploy(&mut config, &name, &project)?;
            Ok(())
        }

        Command::Rollback { path } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            orch.rollback(&mut config, &name)?;
            Ok(())
        }

        Command::Destroy { path, yes } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            orch.destroy(&mut config, &name, yes)
        }

        Command::Status { path } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            cmd_status(&orch, &config, &name, cli.json)
        }

        Command::Sync { path } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            orch.sync(&mut config, &name)
        }

        Command::Logs { path, lines, follow } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let target = config
                .targets
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
            let ssh = orch.ssh_for(&mut config, &name)?;
            crate::service::logs(&ssh, &target.app_name(), lines, follow)
        }

        Command::Ssh { path } => {
            let (name, _) = orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
            let ssh = orch.ssh_for(&mut config, &name)?;
            ssh.connect(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)?;
            ssh.shell()
        }

        Command::Domain { action } => match action {
            DomainAction::Add {
                domain,
                email,
                ssl_manager,
                path,
            } => {
                let (name, _) =
                    orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
                let email = match email {
                    Some(e) => e,
                    None if !cli.no_interactive => {
                        util::prompt_line("Contact email for certificate issuance: ")?
                    }
                    None => return Err(Error::Validation("missing --email".into())),
                };
                orch.add_domain(&mut config, &name, &domain, &email, &ssl_manager)
            }
            DomainAction::Remove { path } => {
                let (name, _) =
                    orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
                orch.remove_domain(&mut config, &name)
            }
            DomainAction::Show { path } => {
                let (name, _) =
                    orch.resolve_target(&config, cli.target.as_deref(), path.as_deref())?;
                let target = config
                    .targets
                    .get(&name)
                    .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
                match (&target.domain, cli.json) {
                    (Some(d), true) => println!("{}", serde_json::to_string_pretty(d)?),
                    (Some(d), false) => {
                        eprintln!("Domain:  {}", d.domain);
                        eprintln!("SSL:     {}", if d.ssl_enabled { "enabled" } else { "disabled" });
                        eprintln!("Proxy:   {}", if d.proxy_type.is_empty() { "nginx" } else { &d.proxy_type });
                    }
                    (None, _) => eprintln!("No domain configured for '{name}'"),
                }
                Ok(())
            }
        },

        Command::Server { action } => match action {
            ServerAction::List => {
                let servers = orch.servers.list()?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&servers)?);
                    return Ok(());
                }
                if servers.is_empty() {
                    eprintln!("No managed servers.");
                }
                for server in servers {
                    eprintln!(
                        "{} ({}) - {} app(s), runtimes: {}",
                        server.server_ip,
                        server.provider,
                        server.deployed_apps.len(),
                        server
                            .installed_runtimes
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                Ok(())
            }
            ServerAction::Show { ip } => {
                let server = orch
                    .servers
                    .load(&ip)?
                    .ok_or_else(|| Error::Validation(format!("no server record for {ip}")))?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&server)?);
                    return Ok(());
                }
                eprintln!("Server {} ({})", server.server_ip, server.provider);
                eprintln!("Proxy: {}", server.proxy_type);
                for app in &server.deployed_apps {
                    eprintln!(
                        "  {} port {} {}",
                        app.app_name,
                        app.port,
                        app.domain.as_deref().unwrap_or("(no domain)")
                    );
                }
                Ok(())
            }
        },

        Command::Config { action } => cmd_config(&orch, &mut config, action, cli.no_interactive),
    }
}

fn cmd_status(orch: &Orchestrator, config: &Config, name: &str, json: bool) -> Result<()> {
    let target = config
        .targets
        .get(name)
        .ok_or_else(|| Error::Validation(format!("no target named '{name}'")))?;
    let state = orch.states.load(name)?;

    if json {
        let doc = serde_json::json!({ "target": target, "state": state });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    eprintln!("Target:     {name}");
    eprintln!("Provider:   {}", target.provider());
    eprintln!("Framework:  {}", target.framework);
    eprintln!("Server:     {}", target.ip().unwrap_or("-"));
    eprintln!("Port:       {}", if target.port == 0 { "-".to_string() } else { target.port.to_string() });
    eprintln!("Created:    {}", state.created);
    eprintln!("Configured: {}", state.configured);
    eprintln!("Release:    {}", state.last_release.as_deref().unwrap_or("-"));
    if let Some(deployed) = state.last_deploy {
        eprintln!("Deployed:   {deployed}");
    }
    if state.push_failed {
        eprintln!(
            "Last push FAILED: {}",
            state.push_failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn cmd_config(
    orch: &Orchestrator,
    config: &mut Config,
    action: ConfigAction,
    no_interactive: bool,
) -> Result<()> {
    match action {
        ConfigAction::List => {
            eprintln!("keep_releases: {}", config.keep_releases);
            eprintln!("tokens: {}", orch.tokens.providers()?.join(", "));
            for (name, target) in &config.targets {
                eprintln!(
                    "target {name}: {} {} ({})",
                    target.provider(),
                    target.ip().unwrap_or("-"),
                    target.framework
                );
            }
            Ok(())
        }
        ConfigAction::SetToken { provider, token } => {
            let token = match token {
                Some(t) => t,
                None if !no_interactive => util::prompt_line(&format!("API token for {provider}: "))?,
                None => return Err(Error::Validation("missing token argument".into())),
            };
            orch.tokens.set(&provider, &token)?;
            eprintln!("Token stored for {provider}");
            Ok(())
        }
        ConfigAction::GetToken { provider } => {
            match orch.tokens.get(&provider)? {
                Some(_) => eprintln!("Token present for {provider}"),
                None => eprintln!("No token stored for {provider}"),
            }
            Ok(())
        }
        ConfigAction::DeleteToken { provider } => {
            if orch.tokens.delete(&provider)? {
                eprintln!("Token removed for {provider}");
            } else {
                eprintln!("No token stored for {provider}");
            }
            Ok(())
        }
        ConfigAction::SetKeepReleases { count } => {
            if count == 0 {
                return Err(Error::Validation("keep-releases must be at least 1".into()));
            }
            config.keep_releases = count;
            orch.configs.save(config)?;
            eprintln!("Keeping {count} release(s) per app");
            Ok(())
        }
    }
}
