use crate::cmd;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

/// Fly.io machines via `flyctl`. Machines get no public IPv4 by
/// default; the orchestrator prompts the user for one instead of
/// polling an API that will never return it.
#[derive(Debug)]
pub struct Flyio;

impl Flyio {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn cli(&self, args: &[&str]) -> ProviderResult<serde_json::Value> {
        if !cmd::command_exists("flyctl") {
            return Err(ProviderError::new(
                "flyio",
                ErrorCode::Api,
                "flyctl is not installed. See https://fly.io/docs/flyctl/install/",
            ));
        }
        let output = cmd::run_unchecked("flyctl", args)
            .map_err(|e| ProviderError::new("flyio", ErrorCode::Api, e.to_string()))?;

        if output.status.success() {
            let raw = String::from_utf8_lossy(&output.stdout);
            if raw.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            Ok(serde_json::from_str(raw.trim()).unwrap_or(serde_json::Value::Null))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = if stderr.to_lowercase().contains("could not find")
                || stderr.contains("404")
            {
                ErrorCode::ServerNotFound
            } else if stderr.to_lowercase().contains("auth") {
                ErrorCode::Auth
            } else {
                ErrorCode::Api
            };
            Err(ProviderError::new("flyio", code, stderr))
        }
    }

    fn parse_machine(machine: &serde_json::Value, region_fallback: &str) -> Server {
        let status = match machine["state"].as_str().unwrap_or_default() {
            "started" => ServerStatus::Active,
            "created" | "starting" => ServerStatus::New,
            "stopped" | "stopping" | "destroyed" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };
        Server {
            id: machine["id"].as_str().unwrap_or_default().to_string(),
            // The machines API reports private addresses only.
            public_ipv4: String::new(),
            status,
            region: machine["region"]
                .as_str()
                .unwrap_or(region_fallback)
                .to_string(),
            created_at: None,
        }
    }
}

impl Provider for Flyio {
    fn name(&self) -> &'static str {
        "flyio"
    }

    fn display_name(&self) -> &'static str {
        "Fly.io"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.cli(&["auth", "whoami", "--json"])?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.cli(&["platform", "regions", "--json"])?;
        Ok(value
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(|r| Region {
                id: r["Code"].as_str().unwrap_or_default().to_string(),
                label: r["Name"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    fn sizes(&self, _region: &str) -> ProviderResult<Vec<Size>> {
        Ok(["shared-cpu-1x", "shared-cpu-2x", "performance-1x", "performance-2x"]
            .iter()
            .map(|s| Size {
                id: (*s).to_string(),
                label: (*s).to_string(),
            })
            .collect())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        Ok(vec![Image {
            id: "ubuntu:24.04".to_string(),
            label: "Ubuntu 24.04 (OCI image)".to_string(),
        }])
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        self.cli(&[
            "apps",
            "create",
            &request.name,
            "--machines",
            "--json",
        ])?;

        let value = self.cli(&[
            "machine",
            "run",
            &request.image,
            "--app",
            &request.name,
            "--region",
            &request.region,
            "--vm-size",
            &request.size,
            "--name",
            &request.name,
            "--json",
        ])?;
        Ok(Self::parse_machine(&value, &request.region))
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self.cli(&["machine", "status", id, "--json"])?;
        Ok(Self::parse_machine(&value, ""))
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.cli(&["machine", "destroy", id, "--force"])?;
        Ok(())
    }

    fn upload_ssh_key(&self, name: &str, _public_key: &str) -> ProviderResult<SshKey> {
        // Key trust rides in through the image/user config; there
        // is no account-level key registry to populate.
        Ok(SshKey {
            id: name.to_string(),
            name: name.to_string(),
        })
    }
}
