use crate::cmd;
use crate::providers::{ErrorCode, ProviderError, ProviderResult};

const REQUEST_TIMEOUT_SECS: u32 = 30;

/// Minimal JSON-over-HTTPS client for the REST providers, shelling
/// out to curl with the trailing-status-line trick: the response
/// body is followed by `\n<http_code>` so one invocation yields
/// both.
#[derive(Debug)]
pub struct ApiClient {
    provider: &'static str,
    base: String,
    token: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(provider: &'static str, base: &str, token: String) -> Self {
        Self {
            provider,
            base: base.to_string(),
            token,
        }
    }

    pub fn get(&self, path: &str) -> ProviderResult<serde_json::Value> {
        self.request("GET", path, None)
    }

    pub fn post(&self, path: &str, body: &serde_json::Value) -> ProviderResult<serde_json::Value> {
        self.request("POST", path, Some(body.to_string()))
    }

    pub fn put(&self, path: &str, body: &serde_json::Value) -> ProviderResult<serde_json::Value> {
        self.request("PUT", path, Some(body.to_string()))
    }

    pub fn delete(&self, path: &str) -> ProviderResult<serde_json::Value> {
        self.request("DELETE", path, None)
    }

    fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<String>,
    ) -> ProviderResult<serde_json::Value> {
        let url = format!("{}{path}", self.base);
        let auth = format!("Authorization: Bearer {}", self.token);
        let max_time = REQUEST_TIMEOUT_SECS.to_string();

        let mut args: Vec<&str> = vec![
            "-sS",
            "-X",
            method,
            "-H",
            auth.as_str(),
            "-H",
            "Content-Type: application/json",
            "--max-time",
            max_time.as_str(),
            "-w",
            "\n%{http_code}",
        ];
        if let Some(b) = &body {
            args.push("-d");
            args.push(b.as_str());
        }
        args.push(url.as_str());

        let output = cmd::run_unchecked("curl", &args).map_err(|e| {
            ProviderError::new(self.provider, ErrorCode::Api, format!("curl: {e}"))
        })?;

        // curl exit 28 is a transport-level timeout.
        if output.status.code() == Some(28) {
            return Err(ProviderError::new(
                self.provider,
                ErrorCode::Timeout,
                format!("{method} {path} timed out"),
            ));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ProviderError::new(
                self.provider,
                ErrorCode::Api,
                format!("{method} {path}: {stderr}"),
            ));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let (payload, status) = split_status(&raw).ok_or_else(|| {
            ProviderError::new(
                self.provider,
                ErrorCode::Api,
                format!("{method} {path}: no status line in response"),
            )
        })?;

        map_status(self.provider, method, path, status, payload)
    }
}

/// Separate the response body from the status code curl appended.
fn split_status(raw: &str) -> Option<(&str, u16)> {
    let idx = raw.rfind('\n')?;
    let status: u16 = raw[idx + 1..].trim().parse().ok()?;
    Some((&raw[..idx], status))
}

fn map_status(
    provider: &'static str,
    method: &str,
    path: &str,
    status: u16,
    payload: &str,
) -> ProviderResult<serde_json::Value> {
    let parse = |text: &str| {
        if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(text).unwrap_or(serde_json::Value::Null)
        }
    };

    match status {
        200..=299 => Ok(parse(payload)),
        401 | 403 => Err(ProviderError::new(
            provider,
            ErrorCode::Auth,
            format!("{method} {path}: authentication rejected (HTTP {status})"),
        )),
        404 => Err(ProviderError::new(
            provider,
            ErrorCode::NotFound,
            format!("{method} {path}: HTTP 404"),
        )),
        429 => Err(ProviderError::new(
            provider,
            ErrorCode::RateLimited,
            format!("{method} {path}: HTTP 429"),
        )),
        _ => {
            let detail = api_message(&parse(payload)).unwrap_or_else(|| payload.trim().to_string());
            Err(ProviderError::new(
                provider,
                ErrorCode::Api,
                format!("{method} {path}: HTTP {status}: {detail}"),
            ))
        }
    }
}

/// Fish a human-readable message out of the common error envelopes
/// (`message`, `error`, `errors[0].message`).
fn api_message(value: &serde_json::Value) -> Option<String> {
    if let Some(m) = value["message"].as_str() {
        return Some(m.to_string());
    }
    if let Some(m) = value["error"].as_str() {
        return Some(m.to_string());
    }
    if let Some(m) = value["errors"]
        .as_array()
        .and_then(|a| a.first())
        .and_then(|e| e["message"].as_str().or_else(|| e["reason"].as_str()))
    {
        return Some(m.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_status() {
        let (body, status) = split_status("{\"ok\":true}\n201").unwrap();
        assert_eq!(body, "{\"ok\":true}");
        assert_eq!(status, 201);
    }

    #[test]
    fn empty_body_with_status() {
        let (body, status) = split_status("\n204").unwrap();
        assert_eq!(body, "");
        assert_eq!(status, 204);
    }

    #[test]
    fn status_mapping() {
        assert!(map_status("p", "GET", "/x", 200, "{}").is_ok());
        assert_eq!(
            map_status("p", "GET", "/x", 401, "").unwrap_err().code,
            ErrorCode::Auth
        );
        assert_eq!(
            map_status("p", "GET", "/x", 404, "").unwrap_err().code,
            ErrorCode::NotFound
        );
        assert_eq!(
            map_status("p", "GET", "/x", 429, "").unwrap_err().code,
            ErrorCode::RateLimited
        );
        assert_eq!(
            map_status("p", "GET", "/x", 500, "{\"message\":\"boom\"}")
                .unwrap_err()
                .code,
            ErrorCode::Api
        );
    }

    #[test]
    fn error_envelope_extraction() {
        let v: serde_json::Value =
            serde_json::from_str("{\"errors\":[{\"reason\":\"quota exceeded\"}]}").unwrap();
        assert_eq!(api_message(&v).as_deref(), Some("quota exceeded"));

        let v: serde_json::Value = serde_json::from_str("{\"message\":\"nope\"}").unwrap();
        assert_eq!(api_message(&v).as_deref(), Some("nope"));
    }
}
