//! HTTPS backend for the provider traits.
//!
//! Requests are signed with Signature Version 4 and sent over one blocking
//! `ureq` agent shared by every region and session.
//!
//! # Submodules
//!
//! - [`credentials`]: the base credential chain (environment, web identity,
//!   shared profiles, container, instance metadata)
//! - [`metadata`]: container and instance metadata endpoints
//! - [`sigv4`]: request signing
//! - [`http`]: signed transport and error decoding
//! - [`sts`]: caller identity and role assumption
//! - [`detective`]: graph and membership operations
use crate::provider::{Connector, ProviderError};
use anyhow::{Context, Result};
use std::time::Duration;

mod credentials;
mod detective;
mod http;
mod metadata;
mod sigv4;
mod sts;

use credentials::{ContainerEndpoint, CredentialFetch, Credentials, RoleRequest};
use detective::{DetectiveClient, DETECTIVE_REGIONS};
use metadata::MetadataClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STS_REGION: &str = "us-east-1";

/// DNS suffix for a region's service endpoints.
pub(crate) fn dns_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Region for STS calls: `AWS_REGION`, then `AWS_DEFAULT_REGION`, then us-east-1.
fn sts_region_from<F>(env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["AWS_REGION", "AWS_DEFAULT_REGION"]
        .into_iter()
        .find_map(|name| env(name).filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_STS_REGION.to_string())
}

/// Assumes roles through STS and hands out Detective clients.
pub struct AwsConnector {
    transport: http::HttpTransport,
    sts: sts::StsClient,
    base: Credentials,
    partition: String,
}

impl AwsConnector {
    /// Discover base credentials and the caller's partition.
    pub fn from_environment() -> Result<Self> {
        let transport = http::HttpTransport::new(REQUEST_TIMEOUT);
        let sts_region = sts_region_from(|name| std::env::var(name).ok());
        let sts = sts::StsClient::new(transport.clone(), &sts_region);
        let sources = ChainSources {
            sts: &sts,
            metadata: MetadataClient::new(),
        };
        let base = credentials::discover(&sources).context("load base credentials")?;
        let partition = sts
            .caller_partition(&base)
            .context("resolve caller identity")?;
        tracing::debug!(partition = partition.as_str(), sts_region, "connected to STS");
        Ok(Self {
            transport,
            sts,
            base,
            partition,
        })
    }

    fn role_arn(&self, account_id: &str, role_name: &str) -> String {
        format!("arn:{}:iam::{account_id}:role/{role_name}", self.partition)
    }
}

impl Connector for AwsConnector {
    type Session = Credentials;
    type Client = DetectiveClient;

    fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_label: &str,
    ) -> Result<Self::Session, ProviderError> {
        let role_arn = self.role_arn(account_id, role_name);
        tracing::debug!(role_arn = role_arn.as_str(), session_label, "assuming role");
        self.sts.assume_role(
            &self.base,
            &RoleRequest {
                role_arn: &role_arn,
                session_name: session_label,
                external_id: None,
            },
        )
    }

    fn client(&self, session: &Self::Session, region: &str) -> Self::Client {
        DetectiveClient::new(self.transport.clone(), session.clone(), region)
    }

    fn available_regions(&self) -> Vec<String> {
        DETECTIVE_REGIONS
            .iter()
            .map(|region| region.to_string())
            .collect()
    }
}

/// Network and process sources for the base credential chain.
struct ChainSources<'a> {
    sts: &'a sts::StsClient,
    metadata: MetadataClient,
}

impl CredentialFetch for ChainSources<'_> {
    fn assume_role(
        &self,
        base: &Credentials,
        role: &RoleRequest<'_>,
    ) -> Result<Credentials, ProviderError> {
        self.sts.assume_role(base, role)
    }

    fn web_identity(
        &self,
        role: &RoleRequest<'_>,
        token: &str,
    ) -> Result<Credentials, ProviderError> {
        self.sts.assume_role_with_web_identity(role, token)
    }

    fn container(&self, endpoint: &ContainerEndpoint) -> Result<Credentials, ProviderError> {
        self.metadata.container(endpoint)
    }

    fn instance(&self, endpoint: &str) -> Result<Credentials, ProviderError> {
        self.metadata.instance(endpoint)
    }

    fn process(&self, command: &str) -> Result<Credentials, ProviderError> {
        credentials::run_process(command)
    }
}
