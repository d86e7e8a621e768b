use chrono::{DateTime, Utc};

use crate::providers::api::ApiClient;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

const API_BASE: &str = "https://api.digitalocean.com/v2";

/// `DigitalOcean` droplets over the v2 REST API.
#[derive(Debug)]
pub struct DigitalOcean {
    api: ApiClient,
}

impl DigitalOcean {
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            api: ApiClient::new("digitalocean", API_BASE, token),
        }
    }

    fn parse_droplet(&self, droplet: &serde_json::Value) -> ProviderResult<Server> {
        let id = droplet["id"]
            .as_u64()
            .map(|id| id.to_string())
            .ok_or_else(|| self.shape_err("droplet id missing"))?;

        let public_ipv4 = droplet["networks"]["v4"]
            .as_array()
            .and_then(|nets| {
                nets.iter()
                    .find(|n| n["type"].as_str() == Some("public"))
                    .and_then(|n| n["ip_address"].as_str())
            })
            .unwrap_or_default()
            .to_string();

        let status = match droplet["status"].as_str().unwrap_or_default() {
            "active" => ServerStatus::Active,
            "new" => ServerStatus::New,
            "off" | "archive" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        Ok(Server {
            id,
            public_ipv4,
            status,
            region: droplet["region"]["slug"].as_str().unwrap_or_default().to_string(),
            created_at: droplet["created_at"]
                .as_str()
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }

    fn shape_err(&self, detail: &str) -> ProviderError {
        ProviderError::new("digitalocean", ErrorCode::Api, format!("unexpected response: {detail}"))
    }
}

impl Provider for DigitalOcean {
    fn name(&self) -> &'static str {
        "digitalocean"
    }

    fn display_name(&self) -> &'static str {
        "DigitalOcean"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.api.get("/account")?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.api.get("/regions?per_page=200")?;
        let regions = value["regions"]
            .as_array()
            .ok_or_else(|| self.shape_err("regions missing"))?
            .iter()
            .filter(|r| r["available"].as_bool().unwrap_or(false))
            .map(|r| Region {
                id: r["slug"].as_str().unwrap_or_default().to_string(),
                label: r["name"].as_str().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(regions)
    }

    fn sizes(&self, region: &str) -> ProviderResult<Vec<Size>> {
        let value = self.api.get("/sizes?per_page=200")?;
        let sizes = value["sizes"]
            .as_array()
            .ok_or_else(|| self.shape_err("sizes missing"))?
            .iter()
            .filter(|s| {
                s["regions"]
                    .as_array()
                    .is_some_and(|rs| rs.iter().any(|r| r.as_str() == Some(region)))
            })
            .map(|s| Size {
                id: s["slug"].as_str().unwrap_or_default().to_string(),
                label: format!(
                    "{} vCPU / {} MB / ${}/mo",
                    s["vcpus"].as_u64().unwrap_or(0),
                    s["memory"].as_u64().unwrap_or(0),
                    s["price_monthly"].as_f64().unwrap_or(0.0)
                ),
            })
            .collect();
        Ok(sizes)
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        let value = self.api.get("/images?type=distribution&per_page=200")?;
        let images = value["images"]
            .as_array()
            .ok_or_else(|| self.shape_err("images missing"))?
            .iter()
            .map(|i| Image {
                id: i["slug"].as_str().unwrap_or_default().to_string(),
                label: i["description"].as_str().unwrap_or_default().to_string(),
            })
            .collect();
        Ok(images)
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        let body = serde_json::json!({
            "name": request.name,
            "region": request.region,
            "size": request.size,
            "image": request.image,
            "ssh_keys": [request.ssh_key_id],
            "user_data": request.user_data,
            "tags": ["lightfold"],
        });
        let value = self.api.post("/droplets", &body)?;
        self.parse_droplet(&value["droplet"])
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self.api.get(&format!("/droplets/{id}")).map_err(|mut e| {
            if e.code == ErrorCode::NotFound {
                e.code = ErrorCode::ServerNotFound;
            }
            e
        })?;
        self.parse_droplet(&value["droplet"])
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.api.delete(&format!("/droplets/{id}"))?;
        Ok(())
    }

    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey> {
        let body = serde_json::json!({ "name": name, "public_key": public_key });
        match self.api.post("/account/keys", &body) {
            Ok(value) => Ok(SshKey {
                id: value["ssh_key"]["id"]
                    .as_u64()
                    .map(|id| id.to_string())
                    .ok_or_else(|| self.shape_err("ssh key id missing"))?,
                name: name.to_string(),
            }),
            // 422 on re-upload of a known key; find it by content.
            Err(e) if e.message.to_lowercase().contains("already in use") => {
                let value = self.api.get("/account/keys?per_page=200")?;
                value["ssh_keys"]
                    .as_array()
                    .and_then(|keys| {
                        keys.iter().find(|k| {
                            k["public_key"].as_str().map(str::trim)
                                == Some(public_key.trim())
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
