//! Provider seams for the security-graph service.
//!
//! The enrollment and decommission flows only talk to these traits, so the
//! HTTPS backend in `crate::aws` and the in-memory fakes used by tests are
//! interchangeable.
use serde::Deserialize;
use std::collections::BTreeMap;

/// Failure of a single provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The endpoint could not be reached at all.
    #[error("cannot reach {endpoint}: {detail}")]
    Connect { endpoint: String, detail: String },
    /// The service answered with an error status.
    #[error("{operation} failed with status {status} ({code}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },
    /// The request could not be sent or the response could not be read.
    #[error("{operation} transport error: {detail}")]
    Transport {
        operation: &'static str,
        detail: String,
    },
    /// The response body did not match the expected shape.
    #[error("decode {operation} response: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },
    /// Credentials or role assumption could not produce a session.
    #[error("credentials: {0}")]
    Credentials(String),
}

impl ProviderError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ProviderError::Connect { .. })
    }
}

/// Membership status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum MemberStatus {
    Invited,
    VerificationInProgress,
    VerificationFailed,
    Enabled,
    AcceptedButDisabled,
    Other(String),
}

impl From<String> for MemberStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "INVITED" => MemberStatus::Invited,
            "VERIFICATION_IN_PROGRESS" => MemberStatus::VerificationInProgress,
            "VERIFICATION_FAILED" => MemberStatus::VerificationFailed,
            "ENABLED" => MemberStatus::Enabled,
            "ACCEPTED_BUT_DISABLED" => MemberStatus::AcceptedButDisabled,
            _ => MemberStatus::Other(raw),
        }
    }
}

/// One row of a member listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDetail {
    pub account_id: String,
    pub status: MemberStatus,
}

/// One page of a member listing.
#[derive(Debug, Clone, Default)]
pub struct MemberPage {
    pub members: Vec<MemberDetail>,
    pub next_token: Option<String>,
}

/// An account the provider refused to process in a batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprocessedAccount {
    pub account_id: String,
    pub reason: String,
}

/// Account submitted to member creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember<'a> {
    pub account_id: &'a str,
    pub contact_address: &'a str,
}

/// Member creation batch.
#[derive(Debug, Clone)]
pub struct CreateMembersRequest<'a> {
    pub graph: &'a str,
    pub message: &'a str,
    pub accounts: Vec<NewMember<'a>>,
    pub disable_email: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CreateMembersResponse {
    pub created: Vec<String>,
    pub unprocessed: Vec<UnprocessedAccount>,
}

/// Graph operations for one region, bound to one session.
pub trait GraphApi {
    fn list_graphs(&self) -> Result<Vec<String>, ProviderError>;
    fn create_graph(&self, tags: &BTreeMap<String, String>) -> Result<String, ProviderError>;
    fn delete_graph(&self, graph: &str) -> Result<(), ProviderError>;
    fn list_members(
        &self,
        graph: &str,
        max_results: u32,
        next_token: Option<&str>,
    ) -> Result<MemberPage, ProviderError>;
    fn create_members(
        &self,
        request: &CreateMembersRequest<'_>,
    ) -> Result<CreateMembersResponse, ProviderError>;
    fn delete_members(
        &self,
        graph: &str,
        account_ids: &[String],
    ) -> Result<Vec<UnprocessedAccount>, ProviderError>;
    /// Accept a pending invitation; the client must carry the member's session.
    fn accept_invitation(&self, graph: &str) -> Result<(), ProviderError>;
}

/// Session acquisition plus per-region client construction.
pub trait Connector {
    type Session;
    type Client: GraphApi;

    fn assume_role(
        &self,
        account_id: &str,
        role_name: &str,
        session_label: &str,
    ) -> Result<Self::Session, ProviderError>;

    fn client(&self, session: &Self::Session, region: &str) -> Self::Client;

    /// Regions where the service is offered.
    fn available_regions(&self) -> Vec<String>;
}

/// List graphs in a region, treating an unreachable endpoint as "no graphs".
pub fn list_graphs_or_empty<A: GraphApi + ?Sized>(
    api: &A,
    region: &str,
) -> Result<Vec<String>, ProviderError> {
    match api.list_graphs() {
        Ok(graphs) => Ok(graphs),
        Err(err) if err.is_connectivity() => {
            tracing::error!(region, "treating region as having no graphs: {err}");
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}
