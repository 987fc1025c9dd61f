//! Container and EC2 instance metadata credential endpoints.
use super::credentials::{ContainerEndpoint, Credentials};
use crate::provider::ProviderError;
use serde::Deserialize;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_PATH: &str = "/latest/api/token";
const ROLE_PATH: &str = "/latest/meta-data/iam/security-credentials/";
const TOKEN_TTL_SECS: &str = "21600";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    code: Option<String>,
    message: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    token: Option<String>,
}

/// Decode the credential document both endpoints return.
pub(crate) fn parse_credentials(source: &str, body: &str) -> Result<Credentials, ProviderError> {
    let document: MetadataCredentials = serde_json::from_str(body)
        .map_err(|err| ProviderError::Credentials(format!("{source} response: {err}")))?;
    if let Some(code) = document.code.filter(|code| code != "Success") {
        return Err(ProviderError::Credentials(format!(
            "{source} returned {code}: {}",
            document.message.unwrap_or_default()
        )));
    }
    match (document.access_key_id, document.secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: document.token.filter(|token| !token.is_empty()),
        }),
        _ => Err(ProviderError::Credentials(format!(
            "{source} response has no access key pair"
        ))),
    }
}

/// Short-timeout agent for link-local credential endpoints.
#[derive(Clone)]
pub struct MetadataClient {
    agent: ureq::Agent,
}

impl MetadataClient {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self { agent }
    }

    pub fn container(&self, endpoint: &ContainerEndpoint) -> Result<Credentials, ProviderError> {
        let mut request = self.agent.get(endpoint.url.as_str());
        if let Some(authorization) = endpoint.authorization.as_deref() {
            request = request.header("authorization", authorization);
        }
        let body = expect_ok("container credentials", request.call())?;
        parse_credentials("container credentials", &body)
    }

    /// IMDSv2, falling back to IMDSv1 when the token call is refused.
    pub fn instance(&self, endpoint: &str) -> Result<Credentials, ProviderError> {
        let token = self.session_token(endpoint)?;
        let get = |path: &str| {
            let mut request = self.agent.get(format!("{endpoint}{path}").as_str());
            if let Some(token) = token.as_deref() {
                request = request.header("x-aws-ec2-metadata-token", token);
            }
            expect_ok("instance metadata", request.call())
        };
        let roles = get(ROLE_PATH)?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                ProviderError::Credentials("instance has no IAM role attached".to_string())
            })?
            .to_string();
        tracing::debug!(role = role.as_str(), "using instance role credentials");
        let body = get(&format!("{ROLE_PATH}{role}"))?;
        parse_credentials("instance metadata", &body)
    }

    fn session_token(&self, endpoint: &str) -> Result<Option<String>, ProviderError> {
        let result = self
            .agent
            .put(format!("{endpoint}{TOKEN_PATH}").as_str())
            .header("x-aws-ec2-metadata-token-ttl-seconds", TOKEN_TTL_SECS)
            .send_empty();
        let mut response = result.map_err(|err| unreachable_endpoint("instance metadata", err))?;
        match response.status().as_u16() {
            200 => response
                .body_mut()
                .read_to_string()
                .map(|token| Some(token.trim().to_string()))
                .map_err(|err| read_error("instance metadata", err)),
            403 | 404 | 405 => Ok(None),
            status => Err(ProviderError::Credentials(format!(
                "instance metadata token request returned status {status}"
            ))),
        }
    }
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

type Reply = Result<ureq::http::Response<ureq::Body>, ureq::Error>;

fn expect_ok(source: &str, reply: Reply) -> Result<String, ProviderError> {
    let mut response = reply.map_err(|err| unreachable_endpoint(source, err))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|err| read_error(source, err))?;
    if !(200..300).contains(&status) {
        return Err(ProviderError::Credentials(format!(
            "{source} returned status {status}: {}",
            body.trim()
        )));
    }
    Ok(body)
}

fn unreachable_endpoint(source: &str, err: ureq::Error) -> ProviderError {
    ProviderError::Credentials(format!("{source} unreachable: {err}"))
}

fn read_error(source: &str, err: ureq::Error) -> ProviderError {
    ProviderError::Credentials(format!("read {source} response: {err}"))
}
