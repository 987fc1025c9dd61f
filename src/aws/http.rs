//! Signed HTTPS calls over a shared blocking agent.
use super::credentials::Credentials;
use super::sigv4::{sign_request, SigningRequest};
use crate::provider::ProviderError;
use crate::util::truncate_string;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_DETAIL_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// One request to a regional service endpoint.
pub struct ServiceCall<'a> {
    pub operation: &'static str,
    pub method: Method,
    pub service: &'a str,
    pub region: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    /// Sign and send `call`, returning the response body of a 2xx answer.
    pub fn send(
        &self,
        call: &ServiceCall<'_>,
        credentials: &Credentials,
    ) -> Result<String, ProviderError> {
        let signed = sign_request(
            &SigningRequest {
                method: call.method.as_str(),
                host: call.host,
                path: call.path,
                content_type: call.content_type,
                body: call.body,
                region: call.region,
                service: call.service,
            },
            credentials,
            Utc::now(),
        );
        let mut headers = vec![
            ("x-amz-date", signed.amz_date),
            ("authorization", signed.authorization),
        ];
        if let Some(token) = signed.security_token {
            headers.push(("x-amz-security-token", token));
        }
        self.execute(call, &headers)
    }

    /// Send `call` without a signature, for operations authorized by a token
    /// in the body.
    pub fn send_unsigned(&self, call: &ServiceCall<'_>) -> Result<String, ProviderError> {
        self.execute(call, &[])
    }

    fn execute(
        &self,
        call: &ServiceCall<'_>,
        headers: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        let url = format!("https://{}{}", call.host, call.path);
        let builder = match call.method {
            Method::Post => self.agent.post(url.as_str()),
            Method::Put => self.agent.put(url.as_str()),
        };
        let mut builder = builder
            .header("content-type", call.content_type)
            .header("accept", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        let started = std::time::Instant::now();
        let mut response = builder
            .send(call.body)
            .map_err(|err| classify_send_error(call, &url, err))?;
        let status = response.status().as_u16();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ProviderError::Transport {
                operation: call.operation,
                detail: format!("read response body: {err}"),
            })?;
        tracing::debug!(
            operation = call.operation,
            region = call.region,
            status,
            elapsed_ms = started.elapsed().as_millis(),
            "service call complete"
        );
        if (200..300).contains(&status) {
            return Ok(body);
        }
        Err(api_error(call.operation, status, error_type.as_deref(), &body))
    }
}

fn classify_send_error(call: &ServiceCall<'_>, url: &str, err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => ProviderError::Connect {
            endpoint: url.to_string(),
            detail: err.to_string(),
        },
        other => ProviderError::Transport {
            operation: call.operation,
            detail: other.to_string(),
        },
    }
}

/// Build an API error from the error-type header and whichever JSON error
/// shape the service returned (REST `message`, JSON `__type`, or query
/// protocol `Error.Code`).
pub(crate) fn api_error(
    operation: &'static str,
    status: u16,
    error_type: Option<&str>,
    body: &str,
) -> ProviderError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let document = parsed
        .as_ref()
        .map(|value| value.get("Error").unwrap_or(value));
    let code = error_type
        .map(str::to_string)
        .or_else(|| first_text(document, &["Code", "__type", "code"]))
        .map(|code| strip_code(&code))
        .unwrap_or_else(|| "Unknown".to_string());
    let message = first_text(document, &["message", "Message"])
        .unwrap_or_else(|| truncate_string(body.trim(), MAX_ERROR_DETAIL_BYTES));
    ProviderError::Api {
        operation,
        status,
        code,
        message,
    }
}

fn first_text(document: Option<&Value>, keys: &[&str]) -> Option<String> {
    let document = document?;
    keys.iter()
        .find_map(|key| document.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// `ValidationException:http://...` and `com.amazon...#ValidationException` both
/// reduce to `ValidationException`.
fn strip_code(raw: &str) -> String {
    let code = raw.split(':').next().unwrap_or(raw);
    code.rsplit('#').next().unwrap_or(code).to_string()
}
