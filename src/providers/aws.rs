use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};

use crate::cmd;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    ServerStatus, Size, SshKey,
};

/// EC2 via the `aws` CLI, the same way the DigitalOcean tooling
/// ecosystem drives `doctl`. Credentials come from the CLI's own
/// config, not the token store.
#[derive(Debug)]
pub struct Aws;

impl Aws {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn cli(&self, args: &[&str]) -> ProviderResult<serde_json::Value> {
        if !cmd::command_exists("aws") {
            return Err(ProviderError::new(
                "aws",
                ErrorCode::Api,
                "aws CLI is not installed. See https://aws.amazon.com/cli/",
            ));
        }
        let mut full = args.to_vec();
        full.extend_from_slice(&["--output", "json"]);
        let output = cmd::run_unchecked("aws", &full)
            .map_err(|e| ProviderError::new("aws", ErrorCode::Api, e.to_string()))?;

        if output.status.success() {
            let raw = String::from_utf8_lossy(&output.stdout);
            if raw.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            serde_json::from_str(raw.trim())
                .map_err(|e| ProviderError::new("aws", ErrorCode::Api, format!("parse: {e}")))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = if stderr.contains("InvalidInstanceID.NotFound")
                || stderr.contains("does not exist")
            {
                ErrorCode::ServerNotFound
            } else if stderr.contains("AuthFailure")
                || stderr.contains("Unable to locate credentials")
                || stderr.contains("ExpiredToken")
            {
                ErrorCode::Auth
            } else if stderr.contains("RequestLimitExceeded") || stderr.contains("Throttling") {
                ErrorCode::RateLimited
            } else {
                ErrorCode::Api
            };
            Err(ProviderError::new("aws", code, stderr))
        }
    }

    fn parse_instance(instance: &serde_json::Value) -> ProviderResult<Server> {
        let id = instance["InstanceId"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| {
                ProviderError::new("aws", ErrorCode::Api, "unexpected response: InstanceId missing")
            })?;

        let status = match instance["State"]["Name"].as_str().unwrap_or_default() {
            "running" => ServerStatus::Active,
            "pending" => ServerStatus::New,
            "stopped" | "stopping" | "shutting-down" | "terminated" => ServerStatus::Off,
            _ => ServerStatus::Unknown,
        };

        Ok(Server {
            id,
            public_ipv4: instance["PublicIpAddress"].as_str().unwrap_or_default().to_string(),
            status,
            region: instance["Placement"]["AvailabilityZone"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            created_at: instance["LaunchTime"]
                .as_str()
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }

    /// Current Ubuntu 24.04 LTS AMI for the region, resolved via
    /// the public SSM parameter so configs need not pin an AMI id.
    fn default_ami(&self, region: &str) -> ProviderResult<String> {
        let value = self.cli(&[
            "ssm",
            "get-parameter",
            "--region",
            region,
            "--name",
            "/aws/service/canonical/ubuntu/server/24.04/stable/current/amd64/hvm/ebs-gp3/ami-id",
        ])?;
        value["Parameter"]["Value"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| ProviderError::new("aws", ErrorCode::Api, "AMI lookup returned nothing"))
    }
}

impl Provider for Aws {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn display_name(&self) -> &'static str {
        "AWS EC2"
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        self.cli(&["sts", "get-caller-identity"])?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        let value = self.cli(&["ec2", "describe-regions"])?;
        Ok(value["Regions"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter_map(|r| r["RegionName"].as_str())
            .map(|name| Region {
                id: name.to_string(),
                label: name.to_string(),
            })
            .collect())
    }

    fn sizes(&self, _region: &str) -> ProviderResult<Vec<Size>> {
        // The full instance-type catalog is enormous; offer the
        // burstable tier the tool's audience actually deploys on.
        Ok(["t3.micro", "t3.small", "t3.medium", "t3.large"]
            .iter()
            .map(|t| Size {
                id: (*t).to_string(),
                label: (*t).to_string(),
            })
            .collect())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        Ok(vec![Image {
            id: String::new(),
            label: "Ubuntu 24.04 LTS (resolved per region)".to_string(),
        }])
    }

    fn provision(&self, request: &ProvisionRequest) -> ProviderResult<Server> {
        let ami = if request.image.is_empty() {
            self.default_ami(&request.region)?
        } else {
            request.image.clone()
        };

        let tag_spec = format!(
            "ResourceType=instance,Tags=[{{Key=Name,Value={}}},{{Key=managed-by,Value=lightfold}}]",
            request.name
        );
        let value = self.cli(&[
            "ec2",
            "run-instances",
            "--region",
            &request.region,
            "--image-id",
            &ami,
            "--instance-type",
            &request.size,
            "--key-name",
            &request.ssh_key_id,
            "--user-data",
            &request.user_data,
            "--tag-specifications",
            &tag_spec,
        ])?;

        let instance = value["Instances"]
            .as_array()
            .and_then(|is| is.first())
            .ok_or_else(|| {
                ProviderError::new("aws", ErrorCode::Api, "run-instances returned no instance")
            })?;
        Self::parse_instance(instance)
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        let value = self.cli(&["ec2", "describe-instances", "--instance-ids", id])?;
        let instance = value["Reservations"]
            .as_array()
            .and_then(|rs| rs.first())
            .and_then(|r| r["Instances"].as_array())
            .and_then(|is| is.first())
            .ok_or_else(|| {
                ProviderError::new("aws", ErrorCode::ServerNotFound, format!("instance {id} not found"))
            })?;
        Self::parse_instance(instance)
    }

    fn destroy(&self, id: &str) -> ProviderResult<()> {
        self.cli(&["ec2", "terminate-instances", "--instance-ids", id])?;
        Ok(())
    }

    fn upload_ssh_key(&self, name: &str, public_key: &str) -> ProviderResult<SshKey> {
        // CLI v2 wants the key material base64-wrapped.
        let material = format!("--public-key-material={}", BASE64.encode(public_key));
        match self.cli(&["ec2", "import-key-pair", "--key-name", name, &material]) {
            Ok(_) => Ok(SshKey {
                id: name.to_string(),
                name: name.to_string(),
            }),
            Err(e) if e.message.contains("InvalidKeyPair.Duplicate") => Ok(SshKey {
                id: name.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}
