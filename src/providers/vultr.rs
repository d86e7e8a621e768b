use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};

use crate::providers::api::ApiClient;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

const API_BASE: &str = "https://api.vultr.com/v2";

/// Vultr instances over the v2 REST API. User data must be
/// base64-encoded on the wire.
#[derive(Debug)]
pub struct Vultr {
    api: ApiClient,
}

impl Vultr {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            api: ApiClient::new("vultr", API_BASE, token),
        }
    }

    fn parse_instance(&self, instance: &serde_json::Value) -> ProviderResult<Server> {
        let id = instance["id"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProviderError::new("vultr", ErrorCode::Api, "unexpected response: instance id missing")
            })?;

        // "active" only means billed; power_status says whether it
        // is actually up.
        let status = match (
            instance["status"].as_str().unwrap_or_default(),
            instance["power_status"].as_str().unwrap_or_default(),
        ) {
            ("active", "running") => ServerStatus::Active,
            ("pending", _) | ("active", "starting") => ServerStatus::New,
            (_, "stopped") => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        let ip = instance["main_ip"].as_str().unwrap_or_default();
        Ok(Server {
            id,
            public_ipv4: if ip == "0.0.0.0" { String::new() } else { ip.to_string() },
            status,
            region: instance["region"].as_str().unwrap_or_default().to_string(),
            created_at: instance["date_created"]
                .as_str()
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }
}

impl Provider for Vultr {
    fn name(&self) -> &'static str {
        "vultr"
    }

    fn display_name(&self) -> &'static str {
        "Vultr"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.api.get("/account")?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.api.get("/regions?per_page=500")?;
        Ok(value["regions"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|r| Region {
                id: r["id"].as_str().unwrap_or_default().to_string(),
                label: format!(
                    "{}, {}",
                    r["city"].as_str().unwrap_or_default(),
                    r["country"].as_str().unwrap_or_default()
                ),
            })
            .collect())
    }

    fn sizes(&self, region: &str) -> ProviderResult<Vec<Size>> {
        let value = self.api.get("/plans?per_page=500")?;
        Ok(value["plans"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter(|p| {
                p["locations"]
                    .as_array()
                    .is_some_and(|ls| ls.iter().any(|l| l.as_str() == Some(region)))
            })
            .map(|p| Size {
                id: p["id"].as_str().unwrap_or_default().to_string(),
                label: format!(
                    "{} vCPU / {} MB / ${}/mo",
                    p["vcpu_count"].as_u64().unwrap_or(0),
                    p["ram"].as_u64().unwrap_or(0),
                    p["monthly_cost"].as_f64().unwrap_or(0.0)
                ),
            })
            .collect())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        let value = self.api.get("/os?per_page=500")?;
        Ok(value["os"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|o| Image {
                id: o["id"].as_u64().unwrap_or(0).to_string(),
                label: o["name"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        let body = serde_json::json!({
            "label": request.name,
            "hostname": request.name,
            "region": request.region,
            "plan": request.size,
            "os_id": request.image.parse::<u64>().unwrap_or(0),
            "sshkey_id": [request.ssh_key_id],
            "user_data": BASE64.encode(&request.user_data),
            "tags": ["lightfold"],
        });
        let value = self.api.post("/instances", &body)?;
        self.parse_instance(&value["instance"])
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self.api.get(&format!("/instances/{id}")).map_err(|mut e| {
            if e.code == ErrorCode::NotFound {
                e.code = ErrorCode::ServerNotFound;
            }
            e
        })?;
        self.parse_instance(&value["instance"])
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.api.delete(&format!("/instances/{id}"))?;
        Ok(())
    }

    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey> {
        let existing = self.api.get("/ssh-keys?per_page=500")?;
        if let Some(key) = existing["ssh_keys"].as_array().and_then(|keys| {
            keys.iter()
                .find(|k| k["ssh_key"].as_str().map(str::trim) == Some(public_key.trim()))
        }) {
            return Ok(SshKey {
                id: key["id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
            });
        }

        let body = serde_json::json!({ "name": name, "ssh_key": public_key });
        let value = self.api.post("/ssh-keys", &body)?;
        Ok(SshKey {
            id: value["ssh_key"]["id"].as_str().unwrap_or_default().to_string(),
            name: name.to_string(),
        })
    }
}
