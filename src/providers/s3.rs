use crate::cmd;
use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    Size, SshKey,
};

/// Static-artifact bucket target. No VM, no SSH; pushes sync the
/// built output with the aws CLI.
#[derive(Debug)]
pub struct S3;

impl S3 {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn unsupported(op: &str) -> ProviderError {
    ProviderError::new(
        "s3",
        ErrorCode::Api,
        format!("{op} does not apply to bucket targets"),
    )
}

impl Provider for S3 {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn display_name(&self) -> &'static str {
        "Amazon S3 (static)"
    }

    fn supports_provisioning(&self) -> bool {
        false
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
        if !cmd::command_exists("aws") {
            return Err(ProviderError::new(
                "s3",
                ErrorCode::Api,
                "aws CLI is not installed. See https://aws.amazon.com/cli/",
            ));
        }
        cmd::run("aws", &["sts", "get-caller-identity", "--output", "json"])
            .map_err(|e| ProviderError::new("s3", ErrorCode::Auth, e.to_string()))?;
        Ok(())
    }

    fn regions(&self) -> ProviderResult<Vec<Region>> {
        Ok(Vec::new())
    }

    fn sizes(&self, _region: &str) -> ProviderResult<Vec<Size>> {
        Ok(Vec::new())
    }

    fn images(&self) -> ProviderResult<Vec<Image>> {
        Ok(Vec::new())
    }

    fn provision(&self, _request: &ProvisionRequest) -> ProviderResult<Server> {
        Err(unsupported("provisioning"))
    }

    fn get_server(&self, id: &str) -> ProviderResult<Server> {
        Err(ProviderError::new(
            "s3",
            ErrorCode::ServerNotFound,
            format!("no server record for {id}"),
        ))
    }

    fn destroy(&self, _id: &str) -> ProviderResult<()> {
        Err(unsupported("destroy"))
    }

    fn upload_ssh_key(&self, _name: &str, _public_key: &str) -> ProviderResult<SshKey> {
        Err(unsupported("SSH key upload"))
    }
}
