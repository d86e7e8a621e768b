use crate::providers::{
    ErrorCode, Image, Provider, ProviderError, ProviderResult, ProvisionRequest, Region, Server,
    Size, SshKey,
};

/// "Bring your own server": a pre-existing host reached only over
/// SSH. Nothing here provisions or destroys machines.
#[derive(Debug)]
pub struct Byos;

fn unsupported(op: &str) -> ProviderError {
    ProviderError::new(
        "byos",
        ErrorCode::Api,
        format!("{op} is not available for user-supplied servers"),
    )
}

impl Provider for Byos {
    fn name(&self) -> &'static str {
        "byos"
    }

    fn display_name(&self) -> &'static str {
        "Bring your own server"
    }

    fn supports_provisioning(&self) -> bool {
        false
    }

    fn supports_byos(&self) -> bool {
        true
    }

    fn validate_credentials(&self) -> ProviderResult<()> {
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
            "byos",
            ErrorCode::ServerNotFound,
            format!("no provider record for {id}"),
        ))
    }

    fn destroy(&self, _id: &str) -> ProviderResult<()> {
        Err(unsupported("destroy"))
    }

    fn upload_ssh_key(&self, _name: &str, _public_key: &str) -> ProviderResult<SshKey> {
        Err(unsupported("SSH key upload"))
    }
}
