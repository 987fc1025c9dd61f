//! Security Token Service: caller identity and role assumption.
use super::credentials::{Credentials, RoleRequest};
use super::http::{HttpTransport, Method, ServiceCall};
use super::sigv4::uri_encode;
use crate::provider::ProviderError;
use serde::Deserialize;

const API_VERSION: &str = "2011-06-15";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCallerIdentityEnvelope {
    get_caller_identity_response: GetCallerIdentityResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCallerIdentityResponse {
    get_caller_identity_result: CallerIdentity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_response: AssumeRoleResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: RoleCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WebIdentityEnvelope {
    assume_role_with_web_identity_response: WebIdentityResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WebIdentityResponse {
    assume_role_with_web_identity_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

#[derive(Clone)]
pub struct StsClient {
    transport: HttpTransport,
    region: String,
    host: String,
}

impl StsClient {
    pub fn new(transport: HttpTransport, region: &str) -> Self {
        Self {
            transport,
            region: region.to_string(),
            host: format!("sts.{region}.{}", super::dns_suffix(region)),
        }
    }

    /// Partition (`aws`, `aws-cn`, `aws-us-gov`) of the calling identity.
    pub fn caller_partition(&self, credentials: &Credentials) -> Result<String, ProviderError> {
        let body = self.call(
            "GetCallerIdentity",
            &[("Action", "GetCallerIdentity")],
            Some(credentials),
        )?;
        let envelope: GetCallerIdentityEnvelope =
            decode("GetCallerIdentity", &body)?;
        partition_of(&envelope.get_caller_identity_response.get_caller_identity_result.arn)
    }

    pub fn assume_role(
        &self,
        credentials: &Credentials,
        role: &RoleRequest<'_>,
    ) -> Result<Credentials, ProviderError> {
        let mut params = vec![
            ("Action", "AssumeRole"),
            ("RoleArn", role.role_arn),
            ("RoleSessionName", role.session_name),
        ];
        if let Some(external_id) = role.external_id {
            params.push(("ExternalId", external_id));
        }
        let body = self.call("AssumeRole", &params, Some(credentials))?;
        let envelope: AssumeRoleEnvelope = decode("AssumeRole", &body)?;
        Ok(issued(envelope.assume_role_response.assume_role_result))
    }

    /// Exchange an OIDC token for role credentials; the call is unsigned.
    pub fn assume_role_with_web_identity(
        &self,
        role: &RoleRequest<'_>,
        token: &str,
    ) -> Result<Credentials, ProviderError> {
        let body = self.call(
            "AssumeRoleWithWebIdentity",
            &[
                ("Action", "AssumeRoleWithWebIdentity"),
                ("RoleArn", role.role_arn),
                ("RoleSessionName", role.session_name),
                ("WebIdentityToken", token),
            ],
            None,
        )?;
        let envelope: WebIdentityEnvelope = decode("AssumeRoleWithWebIdentity", &body)?;
        Ok(issued(
            envelope
                .assume_role_with_web_identity_response
                .assume_role_with_web_identity_result,
        ))
    }

    fn call(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
        credentials: Option<&Credentials>,
    ) -> Result<String, ProviderError> {
        let body = form_body(params);
        let call = ServiceCall {
            operation,
            method: Method::Post,
            service: "sts",
            region: &self.region,
            host: &self.host,
            path: "/",
            content_type: FORM_CONTENT_TYPE,
            body: body.as_bytes(),
        };
        match credentials {
            Some(credentials) => self.transport.send(&call, credentials),
            None => self.transport.send_unsigned(&call),
        }
    }
}

fn issued(result: AssumeRoleResult) -> Credentials {
    let role = result.credentials;
    Credentials {
        access_key_id: role.access_key_id,
        secret_access_key: role.secret_access_key,
        session_token: Some(role.session_token),
    }
}

fn form_body(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .copied()
        .chain(std::iter::once(("Version", API_VERSION)))
        .map(|(key, value)| format!("{}={}", uri_encode(key, true), uri_encode(value, true)))
        .collect::<Vec<_>>()
        .join("&")
}

fn decode<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    body: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|err| ProviderError::Decode {
        operation,
        detail: err.to_string(),
    })
}

fn partition_of(arn: &str) -> Result<String, ProviderError> {
    let mut fields = arn.split(':');
    match (fields.next(), fields.next()) {
        (Some("arn"), Some(partition)) if !partition.is_empty() => Ok(partition.to_string()),
        _ => Err(ProviderError::Decode {
            operation: "GetCallerIdentity",
            detail: format!("unexpected caller arn {arn}"),
        }),
    }
}
