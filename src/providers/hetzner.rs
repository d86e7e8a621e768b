use chrono::{DateTime, Utc};

use crate::providers::api::ApiClient;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

const API_BASE: &str = "https://api.hetzner.cloud/v1";

/// Hetzner Cloud servers over the v1 REST API.
#[derive(Debug)]
pub struct Hetzner {
    api: ApiClient,
}

impl Hetzner {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            api: ApiClient::new("hetzner", API_BASE, token),
        }
    }

    fn parse_server(&self, server: &serde_json::Value) -> ProviderResult<Server> {
        let id = server["id"]
            .as_u64()
            .map(|id| id.to_string())
            .ok_or_else(|| {
                ProviderError::new("hetzner", ErrorCode::Api, "unexpected response: server id missing")
            })?;

        let status = match server["status"].as_str().unwrap_or_default() {
            "running" => ServerStatus::Active,
            "initializing" | "starting" => ServerStatus::New,
            "off" | "stopping" | "deleting" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        Ok(Server {
            id,
            public_ipv4: server["public_net"]["ipv4"]["ip"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            status,
            region: server["datacenter"]["location"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            created_at: server["created"]
                .as_str()
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }
}

impl Provider for Hetzner {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    fn display_name(&self) -> &'static str {
        "Hetzner Cloud"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.api.get("/locations")?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.api.get("/locations")?;
        Ok(value["locations"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|l| Region {
                id: l["name"].as_str().unwrap_or_default().to_string(),
                label: l["description"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn sizes(&self, _region: &str) -> ProviderResult<Vec<Size>> {
        let value = self.api.get("/server_types?per_page=50")?;
        Ok(value["server_types"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter(|t| !t["deprecated"].as_bool().unwrap_or(false))
            .map(|t| Size {
                id: t["name"].as_str().unwrap_or_default().to_string(),
                label: format!(
                    "{} vCPU / {} GB",
                    t["cores"].as_u64().unwrap_or(0),
                    t["memory"].as_f64().unwrap_or(0.0)
                ),
            })
            .collect())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        let value = self.api.get("/images?type=system&per_page=100")?;
        Ok(value["images"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|i| Image {
                id: i["name"].as_str().unwrap_or_default().to_string(),
                label: i["description"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        let body = serde_json::json!({
            "name": request.name,
            "server_type": request.size,
            "location": request.region,
            "image": request.image,
            "ssh_keys": [request.ssh_key_id],
            "user_data": request.user_data,
            "labels": { "managed-by": "lightfold" },
        });
        let value = self.api.post("/servers", &body)?;
        self.parse_server(&value["server"])
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self.api.get(&format!("/servers/{id}")).map_err(|mut e| {
            if e.code == ErrorCode::NotFound {
                e.code = ErrorCode::ServerNotFound;
            }
            e
        })?;
        self.parse_server(&value["server"])
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.api.delete(&format!("/servers/{id}"))?;
        Ok(())
    }

    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey> {
        let body = serde_json::json!({ "name": name, "public_key": public_key });
        match self.api.post("/ssh_keys", &body) {
            Ok(value) => Ok(SshKey {
                id: value["ssh_key"]["id"]
                    .as_u64()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                name: name.to_string(),
            }),
            // Uniqueness violation: the key is already uploaded.
            Err(e) if e.message.to_lowercase().contains("uniqueness") => {
                let value = self.api.get("/ssh_keys?per_page=50")?;
                value["ssh_keys"]
                    .as_array()
                    .and_then(|keys| {
                        keys.iter().find(|k| {
                            k["public_key"].as_str().map(str::trim) == Some(public_key.trim())
                        })
                    })
                    .and_then(|k| k["id"].as_u64())
                    .map(|id| SshKey {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .ok_or(e)
            }
            Err(e) => Err(e),
        }
    }
}
