//! Amazon Detective REST operations.
use super::credentials::Credentials;
use super::http::{HttpTransport, Method, ServiceCall};
use crate::provider::{
    CreateMembersRequest, CreateMembersResponse, GraphApi, MemberDetail, MemberPage,
    MemberStatus, ProviderError, UnprocessedAccount,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Commercial regions where the service is offered.
pub const DETECTIVE_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ca-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "il-central-1",
    "me-central-1",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListGraphsInput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListGraphsOutput {
    #[serde(default)]
    graph_list: Vec<GraphEntry>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GraphEntry {
    arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateGraphInput<'a> {
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a BTreeMap<String, String>,
}

fn no_tags(tags: &&BTreeMap<String, String>) -> bool {
    tags.is_empty()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateGraphOutput {
    graph_arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GraphInput<'a> {
    graph_arn: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListMembersInput<'a> {
    graph_arn: &'a str,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListMembersOutput {
    #[serde(default)]
    member_details: Vec<WireMember>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMember {
    account_id: String,
    status: MemberStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateMembersInput<'a> {
    graph_arn: &'a str,
    message: &'a str,
    disable_email_notification: bool,
    accounts: Vec<WireAccount<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireAccount<'a> {
    account_id: &'a str,
    email_address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateMembersOutput {
    #[serde(default)]
    members: Vec<WireMember>,
    #[serde(default)]
    unprocessed_accounts: Vec<WireUnprocessed>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMembersInput<'a> {
    graph_arn: &'a str,
    account_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteMembersOutput {
    #[serde(default)]
    unprocessed_accounts: Vec<WireUnprocessed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUnprocessed {
    account_id: String,
    #[serde(default)]
    reason: String,
}

impl From<WireUnprocessed> for UnprocessedAccount {
    fn from(wire: WireUnprocessed) -> Self {
        UnprocessedAccount {
            account_id: wire.account_id,
            reason: wire.reason,
        }
    }
}

/// Detective client bound to one session and one region.
pub struct DetectiveClient {
    transport: HttpTransport,
    credentials: Credentials,
    region: String,
    host: String,
}

impl DetectiveClient {
    pub fn new(transport: HttpTransport, credentials: Credentials, region: &str) -> Self {
        Self {
            transport,
            credentials,
            region: region.to_string(),
            host: format!("api.detective.{region}.{}", super::dns_suffix(region)),
        }
    }

    fn call<I: Serialize, O: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        input: &I,
    ) -> Result<O, ProviderError> {
        let body = serde_json::to_vec(input).map_err(|err| ProviderError::Transport {
            operation,
            detail: format!("encode request: {err}"),
        })?;
        let response = self.transport.send(
            &ServiceCall {
                operation,
                method,
                service: "detective",
                region: &self.region,
                host: &self.host,
                path,
                content_type: JSON_CONTENT_TYPE,
                body: &body,
            },
            &self.credentials,
        )?;
        decode(operation, &response)
    }
}

/// Empty success bodies decode as `{}`.
fn decode<O: DeserializeOwned>(operation: &'static str, body: &str) -> Result<O, ProviderError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|err| ProviderError::Decode {
        operation,
        detail: err.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct Empty {}

impl GraphApi for DetectiveClient {
    fn list_graphs(&self) -> Result<Vec<String>, ProviderError> {
        let mut graphs = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page: ListGraphsOutput = self.call(
                "ListGraphs",
                Method::Post,
                "/graphs/list",
                &ListGraphsInput {
                    next_token: next_token.as_deref(),
                },
            )?;
            graphs.extend(page.graph_list.into_iter().map(|graph| graph.arn));
            match page.next_token.filter(|token| !token.is_empty()) {
                Some(token) => next_token = Some(token),
                None => return Ok(graphs),
            }
        }
    }

    fn create_graph(&self, tags: &BTreeMap<String, String>) -> Result<String, ProviderError> {
        let output: CreateGraphOutput =
            self.call("CreateGraph", Method::Post, "/graph", &CreateGraphInput { tags })?;
        Ok(output.graph_arn)
    }

    fn delete_graph(&self, graph: &str) -> Result<(), ProviderError> {
        let _: Empty = self.call(
            "DeleteGraph",
            Method::Post,
            "/graph/removal",
            &GraphInput { graph_arn: graph },
        )?;
        Ok(())
    }

    fn list_members(
        &self,
        graph: &str,
        max_results: u32,
        next_token: Option<&str>,
    ) -> Result<MemberPage, ProviderError> {
        let output: ListMembersOutput = self.call(
            "ListMembers",
            Method::Post,
            "/graph/members/list",
            &ListMembersInput {
                graph_arn: graph,
                max_results,
                next_token,
            },
        )?;
        Ok(MemberPage {
            members: output
                .member_details
                .into_iter()
                .map(|member| MemberDetail {
                    account_id: member.account_id,
                    status: member.status,
                })
                .collect(),
            next_token: output.next_token,
        })
    }

    fn create_members(
        &self,
        request: &CreateMembersRequest<'_>,
    ) -> Result<CreateMembersResponse, ProviderError> {
        let output: CreateMembersOutput = self.call(
            "CreateMembers",
            Method::Post,
            "/graph/members",
            &CreateMembersInput {
                graph_arn: request.graph,
                message: request.message,
                disable_email_notification: request.disable_email,
                accounts: request
                    .accounts
                    .iter()
                    .map(|account| WireAccount {
                        account_id: account.account_id,
                        email_address: account.contact_address,
                    })
                    .collect(),
            },
        )?;
        Ok(CreateMembersResponse {
            created: output
                .members
                .into_iter()
                .map(|member| member.account_id)
                .collect(),
            unprocessed: output
                .unprocessed_accounts
                .into_iter()
                .map(UnprocessedAccount::from)
                .collect(),
        })
    }

    fn delete_members(
        &self,
        graph: &str,
        account_ids: &[String],
    ) -> Result<Vec<UnprocessedAccount>, ProviderError> {
        let output: DeleteMembersOutput = self.call(
            "DeleteMembers",
            Method::Post,
            "/graph/members/removal",
            &DeleteMembersInput {
                graph_arn: graph,
                account_ids,
            },
        )?;
        Ok(output
            .unprocessed_accounts
            .into_iter()
            .map(UnprocessedAccount::from)
            .collect())
    }

    fn accept_invitation(&self, graph: &str) -> Result<(), ProviderError> {
        let _: Empty = self.call(
            "AcceptInvitation",
            Method::Put,
            "/invitation",
            &GraphInput { graph_arn: graph },
        )?;
        Ok(())
    }
}
