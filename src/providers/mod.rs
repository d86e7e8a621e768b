pub mod api;
pub mod aws;
pub mod byos;
pub mod digitalocean;
pub mod flyio;
pub mod hetzner;
pub mod linode;
pub mod s3;
pub mod vultr;

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

pub const PROVISION_TIMEOUT: Duration = Duration::from_secs(600);
pub const DESTROY_TIMEOUT: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Typed provider failure; `code` drives retry and idempotent
/// destroy decisions.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider}: {message} ({code})")]
pub struct ProviderError {
    pub provider: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    ServerNotFound,
    RateLimited,
    Auth,
    Timeout,
    Api,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::ServerNotFound => "server_not_found",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::Timeout => "timeout",
            Self::Api => "api",
        };
        f.write_str(s)
    }
}

impl ProviderError {
    #[must_use]
    pub fn new(provider: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            provider,
            code,
            message: message.into(),
        }
    }

    /// Destroy callers treat any "already gone" shape as success:
    /// the typed codes, or provider message text for APIs that
    /// report deletion of missing resources as a generic error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        if matches!(self.code, ErrorCode::NotFound | ErrorCode::ServerNotFound) {
            return true;
        }
        let lower = self.message.to_lowercase();
        lower.contains("not found") || lower.contains("404") || lower.contains("does not exist")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    New,
    Active,
    Off,
    Unknown,
}

/// A provisioned (or looked-up) machine as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    /// Empty until the provider assigns one (fly.io-class APIs may
    /// never fill it; callers prompt instead of polling forever).
    pub public_ipv4: String,
    pub status: ServerStatus,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SshKey {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Size {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    pub label: String,
}

/// Everything a provider needs to create one VM.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_key_id: String,
    pub user_data: String,
}

/// Uniform capability surface over heterogeneous cloud APIs.
pub trait Provider: std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn display_name(&self) -> &'static str;

    fn supports_provisioning(&self) -> bool {
        true
    }

    fn supports_byos(&self) -> bool {
        false
    }

    fn validate_credentials(&self) -> ProviderResult<()>;

    fn regions(&self) -> ProviderResult<Vec<Region>>;
    fn sizes(&self, region: &str) -> ProviderResult<Vec<Size>>;
    fn images(&self) -> ProviderResult<Vec<Image>>;

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server>;

    fn get_server(&self, id: &str) -> ProviderResult<Server>;

    /// Poll until the server reports active with an IP, or the
    /// deadline passes.
    fn wait_for_active(&self, id: &str, timeout: Duration) -> ProviderResult<Server> {
        let deadline = Instant::now() + timeout;
        loop {
            let server = self.get_server(id)?;
            if server.status == ServerStatus::Active && !server.public_ipv4.is_empty() {
                return Ok(server);
            }
            if Instant::now() >= deadline {
                return Err(ProviderError::new(
                    self.name(),
                    ErrorCode::Timeout,
                    format!("server {id} not active within {}s", timeout.as_secs()),
                ));
            }
            tracing::debug!(provider = self.name(), id, status = ?server.status, "waiting for active");
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Must fail with a not-found code when the resource is
    /// already gone; callers map that to success.
    fn destroy(&self, id: &str) -> ProviderResult<()>;

    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey>;
}

pub const PROVIDER_NAMES: &[&str] = &[
    "digitalocean",
    "hetzner",
    "vultr",
    "linode",
    "aws",
    "flyio",
    "byos",
    "s3",
];

/// Name-keyed constructor map. REST providers take the account
/// token; CLI-backed providers authenticate through their own
/// tooling and ignore it.
pub fn provider_for(name: &str, token: Option<String>) -> ProviderResult<Box<dyn Provider>> {
    let need_token = |provider: &'static str| {
        token.clone().ok_or_else(|| {
            ProviderError::new(
                provider,
                ErrorCode::Auth,
                format!("no API token for '{provider}'. Add one with: lightfold config set-token {provider}"),
            )
        })
    };

    match name {
        "digitalocean" => Ok(Box::new(digitalocean::DigitalOcean::new(need_token(
            "digitalocean",
        )?))),
        "hetzner" => Ok(Box::new(hetzner::Hetzner::new(need_token("hetzner")?))),
        "vultr" => Ok(Box::new(vultr::Vultr::new(need_token("vultr")?))),
        "linode" => Ok(Box::new(linode::Linode::new(need_token("linode")?))),
        "aws" => Ok(Box::new(aws::Aws::new())),
        "flyio" => Ok(Box::new(flyio::Flyio::new())),
        "byos" => Ok(Box::new(byos::Byos)),
        "s3" => Ok(Box::new(s3::S3::new())),
        other => Err(ProviderError::new(
            "registry",
            ErrorCode::Api,
            format!("unknown provider '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_by_code_and_by_message() {
        let by_code = ProviderError::new("hetzner", ErrorCode::ServerNotFound, "gone");
        assert!(by_code.is_not_found());

        let by_message = ProviderError::new("vultr", ErrorCode::Api, "Instance does not exist");
        assert!(by_message.is_not_found());

        let by_status = ProviderError::new("linode", ErrorCode::Api, "HTTP 404");
        assert!(by_status.is_not_found());

        let real = ProviderError::new("aws", ErrorCode::Api, "throttled");
        assert!(!real.is_not_found());
    }

    #[test]
    fn registry_knows_every_name() {
        for name in PROVIDER_NAMES {
            let result = provider_for(name, Some("tok".to_string()));
            assert!(result.is_ok(), "no constructor for {name}");
            assert_eq!(result.unwrap().name(), *name);
        }
        assert!(provider_for("gcp", None).is_err());
    }

    #[test]
    fn rest_providers_demand_a_token() {
        let err = provider_for("hetzner", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::Auth);
        assert!(err.message.contains("set-token hetzner"));
    }

    #[test]
    fn byos_capabilities() {
        let p = provider_for("byos", None).unwrap();
        assert!(!p.supports_provisioning());
        assert!(p.supports_byos());
    }
}
