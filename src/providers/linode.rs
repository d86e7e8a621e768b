use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};

use crate::providers::api::ApiClient;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

const API_BASE: &str = "https://api.linode.com/v4";

/// Linode instances over the v4 REST API.
#[derive(Debug)]
pub struct Linode {
    api: ApiClient,
}

impl Linode {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            api: ApiClient::new("linode", API_BASE, token),
        }
    }

    fn parse_instance(&self, instance: &serde_json::Value) -> ProviderResult<Server> {
        let id = instance["id"]
            .as_u64()
            .map(|id| id.to_string())
            .ok_or_else(|| {
                ProviderError::new("linode", ErrorCode::Api, "unexpected response: linode id missing")
            })?;

        let status = match instance["status"].as_str().unwrap_or_default() {
            "running" => ServerStatus::Active,
            "provisioning" | "booting" | "migrating" => ServerStatus::New,
            "offline" | "shutting_down" | "stopped" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        Ok(Server {
            id,
            public_ipv4: instance["ipv4"]
                .as_array()
                .and_then(|ips| ips.first())
                .and_then(|ip| ip.as_str())
                .unwrap_or_default()
                .to_string(),
            status,
            region: instance["region"].as_str().unwrap_or_default().to_string(),
            created_at: instance["created"]
                .as_str()
                .and_then(|s| format!("{s}Z").parse::<DateTime<Utc>>().ok()),
        })
    }
}

/// Linode insists on a root password even when SSH keys are the
/// only intended login path. 32 hex chars from the kernel RNG.
fn random_root_pass() -> std::io::Result<String> {
    let mut bytes = [0u8; 16];
    std::fs::File::open("/dev/urandom")?.read_exact(&mut bytes)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

impl Provider for Linode {
    fn name(&self) -> &'static str {
        "linode"
    }

    fn display_name(&self) -> &'static str {
        "Linode"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.api.get("/profile")?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.api.get("/regions")?;
        Ok(value["data"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|r| Region {
                id: r["id"].as_str().unwrap_or_default().to_string(),
                label: r["label"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn sizes(&self, _region: &str) -> ProviderResult<Vec<Size>> {
        let value = self.api.get("/linode/types")?;
        Ok(value["data"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|t| Size {
                id: t["id"].as_str().unwrap_or_default().to_string(),
                label: t["label"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        let value = self.api.get("/images")?;
        Ok(value["data"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter(|i| i["is_public"].as_bool().unwrap_or(false))
            .map(|i| Image {
                id: i["id"].as_str().unwrap_or_default().to_string(),
                label: i["label"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        let root_pass = random_root_pass().map_err(|e| {
            ProviderError::new("linode", ErrorCode::Api, format!("entropy source: {e}"))
        })?;
        let body = serde_json::json!({
            "label": request.name,
            "region": request.region,
            "type": request.size,
            "image": request.image,
            "root_pass": root_pass,
            "authorized_keys": [request.ssh_key_id],
            "metadata": { "user_data": BASE64.encode(&request.user_data) },
            "tags": ["lightfold"],
        });
        let value = self.api.post("/linode/instances", &body)?;
        self.parse_instance(&value)
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self
            .api
            .get(&format!("/linode/instances/{id}"))
            .map_err(|mut e| {
                if e.code == ErrorCode::NotFound {
                    e.code = ErrorCode::ServerNotFound;
                }
                e
            })?;
        self.parse_instance(&value)
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.api.delete(&format!("/linode/instances/{id}"))?;
        Ok(())
    }

    /// Linode attaches raw public keys at provision time; the
    /// "upload" just returns the key content as its own handle.
    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey> {
        Ok(SshKey {
            id: public_key.trim().to_string(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_pass_is_hex_and_long_enough() {
        let pass = random_root_pass().unwrap();
        assert_eq!(pass.len(), 32);
        assert!(pass.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
