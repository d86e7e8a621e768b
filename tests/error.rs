use lightfold::error::Error;
use lightfold::providers::{ErrorCode, ProviderError};

#[test]
fn display_config() {
    let err = Error::Config("bad json".into());
    assert_eq!(err.to_string(), "config error: bad json");
}

#[test]
fn display_validation() {
    let err = Error::Validation("missing --provider".into());
    assert_eq!(err.to_string(), "invalid input: missing --provider");
}

#[test]
fn display_ssh() {
    let err = Error::Ssh("timeout".into());
    assert_eq!(err.to_string(), "SSH error: timeout");
}

#[test]
fn display_deployment() {
    let err = Error::Deployment("build exited 2".into());
    assert_eq!(err.to_string(), "deployment failed: build exited 2");
}

#[test]
fn display_state() {
    let err = Error::State("torn write".into());
    assert_eq!(err.to_string(), "state store error: torn write");
}

#[test]
fn display_health_check() {
    let err = Error::HealthCheckTimeout("web".into(), 5);
    assert_eq!(err.to_string(), "health check failed for web after 5 attempts");
}

#[test]
fn display_ports_exhausted() {
    let err = Error::PortsExhausted("10.0.0.1".into());
    assert_eq!(err.to_string(), "no free port on 10.0.0.1 in range 3000-9000");
}

#[test]
fn display_command_not_found() {
    let err = Error::CommandNotFound("tar".into());
    assert_eq!(err.to_string(), "command not found: tar");
}

#[test]
fn provider_error_carries_code() {
    let perr = ProviderError::new("hetzner", ErrorCode::RateLimited, "slow down");
    let err: Error = perr.into();
    assert_eq!(err.to_string(), "hetzner: slow down (rate_limited)");
}

#[test]
fn deployment_classification() {
    assert!(Error::Deployment("x".into()).is_deployment());
    assert!(Error::HealthCheckTimeout("web".into(), 5).is_deployment());
    assert!(!Error::Validation("x".into()).is_deployment());
    assert!(!Error::Ssh("x".into()).is_deployment());
}

#[test]
fn from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn from_json_error() {
    let json_err = serde_json::from_str::<Vec<u64>>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
