//! Detect-and-deploy orchestrator for your own servers.
//!
//! Lightfold takes a local project, figures out what it is, and
//! ships it to a VM it provisioned for you - or to a server you
//! already have. Releases are Capistrano-style: immutable
//! timestamped directories, an atomically swapped `current`
//! symlink, a TCP health check, and automatic rollback when the
//! new release never starts answering.
//!
//! # Overview
//!
//! A deployment runs through four phases, each skippable when its
//! cached state says the work is already done:
//!
//! 1. **Detect** - language, framework, build and run plans from
//!    project markers ([`detect`])
//! 2. **Create** - provision a VM with cloud-init, or validate a
//!    user-supplied host ([`providers`], [`cloudinit`])
//! 3. **Configure** - baseline packages, language runtime, reverse
//!    proxy, app directory layout ([`runtimes`], [`proxy`])
//! 4. **Push** - tarball, upload, build, atomic activation, health
//!    check, rollback ([`release`])
//!
//! Several apps can share one server: ports are allocated from a
//! per-server range, the proxy routes by hostname, and destroying
//! the last app on a VM is what destroys the VM.
//!
//! # Quick start
//!
//! ```sh
//! lightfold config set-token digitalocean
//! lightfold deploy --provider digitalocean --region nyc1 --size s-1vcpu-1gb
//! lightfold logs -f
//! lightfold rollback
//! ```
//!
//! Every registry here (providers, runtime installers, proxy
//! managers, SSL managers) is keyed by name; adding a provider
//! means implementing [`providers::Provider`] and registering the
//! constructor.

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cleaner;
pub mod cli;
pub mod cloudinit;
pub mod cmd;
pub mod compose;
pub mod config;
pub mod detect;
pub mod error;
pub mod firewall;
pub mod keys;
pub mod orchestrator;
pub mod providers;
pub mod proxy;
pub mod release;
pub mod runtimes;
pub mod server_state;
pub mod service;
pub mod ssh;
pub mod ssl;
pub mod state;
pub mod tokens;
pub mod util;

pub use config::{Config, ConfigStore, Target};
pub use detect::Detection;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use release::ReleaseExecutor;
pub use runtimes::Runtime;
pub use server_state::{ServerState, ServerStore};
pub use ssh::SshExecutor;
pub use state::{StateStore, TargetState};
