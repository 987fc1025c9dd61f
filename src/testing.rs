//! In-memory provider fakes shared by unit tests.
use crate::observer::{EnrollEvent, RunEvent, RunObserver};
use crate::prompt::Confirmer;
use crate::provider::{
    Connector, CreateMembersRequest, CreateMembersResponse, GraphApi, MemberDetail, MemberPage,
    MemberStatus, ProviderError, UnprocessedAccount,
};
use crate::reconcile::{InvitationAcceptor, Pause};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// Calls received by a [`FakeGraph`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListGraphs,
    CreateGraph(BTreeMap<String, String>),
    DeleteGraph(String),
    ListMembers {
        graph: String,
        token: Option<String>,
    },
    CreateMembers {
        graph: String,
        accounts: Vec<String>,
        disable_email: bool,
    },
    DeleteMembers {
        graph: String,
        account_ids: Vec<String>,
    },
    AcceptInvitation {
        account: String,
        graph: String,
    },
}

pub fn member(account_id: &str, status: &str) -> MemberDetail {
    MemberDetail {
        account_id: account_id.to_string(),
        status: MemberStatus::from(status.to_string()),
    }
}

pub fn invited(ids: &[&str]) -> Vec<MemberDetail> {
    ids.iter().map(|id| member(id, "INVITED")).collect()
}

pub fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// One region's provider state.
///
/// Each listing that starts without a continuation token first pops the next
/// scripted membership, if any, so tests can model invitations landing late.
#[derive(Default)]
pub struct FakeGraph {
    pub graphs: RefCell<Vec<String>>,
    pub members: RefCell<Vec<MemberDetail>>,
    pub scripted: RefCell<VecDeque<Vec<MemberDetail>>>,
    pub rejected: RefCell<BTreeMap<String, String>>,
    pub calls: RefCell<Vec<Call>>,
    pub unreachable: Cell<bool>,
    pub fail_listing: Cell<bool>,
    pub fail_create: Cell<bool>,
    pub fail_delete: Cell<bool>,
    /// Created members show up as invited on the next listing.
    pub auto_invite: Cell<bool>,
    created_graphs: Cell<usize>,
}

impl FakeGraph {
    pub fn with_graph(graph: &str) -> Self {
        let fake = Self::default();
        fake.graphs.borrow_mut().push(graph.to_string());
        fake
    }

    pub fn script(&self, listing: Vec<MemberDetail>) {
        self.scripted.borrow_mut().push_back(listing);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn create_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateMembers { accounts, .. } => Some(accounts),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteMembers { account_ids, .. } => Some(account_ids),
                _ => None,
            })
            .collect()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::AcceptInvitation { account, .. } => Some(account),
                _ => None,
            })
            .collect()
    }

    fn api_error(operation: &'static str) -> ProviderError {
        ProviderError::Api {
            operation,
            status: 500,
            code: "InternalServerException".to_string(),
            message: "scripted failure".to_string(),
        }
    }
}

impl GraphApi for FakeGraph {
    fn list_graphs(&self) -> Result<Vec<String>, ProviderError> {
        self.calls.borrow_mut().push(Call::ListGraphs);
        if self.unreachable.get() {
            return Err(ProviderError::Connect {
                endpoint: "https://fake".to_string(),
                detail: "connection refused".to_string(),
            });
        }
        Ok(self.graphs.borrow().clone())
    }

    fn create_graph(&self, tags: &BTreeMap<String, String>) -> Result<String, ProviderError> {
        self.calls.borrow_mut().push(Call::CreateGraph(tags.clone()));
        let index = self.created_graphs.get() + 1;
        self.created_graphs.set(index);
        let graph = format!("arn:aws:detective:fake:000000000000:graph:created{index}");
        self.graphs.borrow_mut().push(graph.clone());
        Ok(graph)
    }

    fn delete_graph(&self, graph: &str) -> Result<(), ProviderError> {
        self.calls
            .borrow_mut()
            .push(Call::DeleteGraph(graph.to_string()));
        self.graphs.borrow_mut().retain(|existing| existing != graph);
        Ok(())
    }

    fn list_members(
        &self,
        graph: &str,
        max_results: u32,
        next_token: Option<&str>,
    ) -> Result<MemberPage, ProviderError> {
        self.calls.borrow_mut().push(Call::ListMembers {
            graph: graph.to_string(),
            token: next_token.map(str::to_string),
        });
        if self.fail_listing.get() {
            return Err(Self::api_error("ListMembers"));
        }
        if next_token.is_none() {
            if let Some(listing) = self.scripted.borrow_mut().pop_front() {
                *self.members.borrow_mut() = listing;
            }
        }
        let members = self.members.borrow();
        let start: usize = next_token.map_or(0, |token| token.parse().unwrap_or(0));
        let end = (start + max_results as usize).min(members.len());
        let next_token = (end < members.len()).then(|| end.to_string());
        Ok(MemberPage {
            members: members[start..end].to_vec(),
            next_token,
        })
    }

    fn create_members(
        &self,
        request: &CreateMembersRequest<'_>,
    ) -> Result<CreateMembersResponse, ProviderError> {
        let accounts: Vec<String> = request
            .accounts
            .iter()
            .map(|account| account.account_id.to_string())
            .collect();
        self.calls.borrow_mut().push(Call::CreateMembers {
            graph: request.graph.to_string(),
            accounts: accounts.clone(),
            disable_email: request.disable_email,
        });
        if self.fail_create.get() {
            return Err(Self::api_error("CreateMembers"));
        }
        let rejected = self.rejected.borrow();
        let mut response = CreateMembersResponse::default();
        for account in accounts {
            match rejected.get(&account) {
                Some(reason) => response.unprocessed.push(UnprocessedAccount {
                    account_id: account,
                    reason: reason.clone(),
                }),
                None => response.created.push(account),
            }
        }
        if self.auto_invite.get() {
            let mut members = self.members.borrow_mut();
            for account in &response.created {
                if !members.iter().any(|existing| &existing.account_id == account) {
                    members.push(member(account, "INVITED"));
                }
            }
        }
        Ok(response)
    }

    fn delete_members(
        &self,
        graph: &str,
        account_ids: &[String],
    ) -> Result<Vec<UnprocessedAccount>, ProviderError> {
        self.calls.borrow_mut().push(Call::DeleteMembers {
            graph: graph.to_string(),
            account_ids: account_ids.to_vec(),
        });
        if self.fail_delete.get() {
            return Err(Self::api_error("DeleteMembers"));
        }
        let rejected = self.rejected.borrow();
        Ok(account_ids
            .iter()
            .filter_map(|account| {
                rejected.get(account).map(|reason| UnprocessedAccount {
                    account_id: account.clone(),
                    reason: reason.clone(),
                })
            })
            .collect())
    }

    fn accept_invitation(&self, graph: &str) -> Result<(), ProviderError> {
        self.calls.borrow_mut().push(Call::AcceptInvitation {
            account: "<direct>".to_string(),
            graph: graph.to_string(),
        });
        Ok(())
    }
}

/// Client handed out by [`FakeConnector`]; remembers whose session it uses.
pub struct FakeClient {
    pub account: String,
    pub region: Rc<FakeGraph>,
}

impl GraphApi for FakeClient {
    fn list_graphs(&self) -> Result<Vec<String>, ProviderError> {
        self.region.list_graphs()
    }

    fn create_graph(&self, tags: &BTreeMap<String, String>) -> Result<String, ProviderError> {
        self.region.create_graph(tags)
    }

    fn delete_graph(&self, graph: &str) -> Result<(), ProviderError> {
        self.region.delete_graph(graph)
    }

    fn list_members(
        &self,
        graph: &str,
        max_results: u32,
        next_token: Option<&str>,
    ) -> Result<MemberPage, ProviderError> {
        self.region.list_members(graph, max_results, next_token)
    }

    fn create_members(
        &self,
        request: &CreateMembersRequest<'_>,
    ) -> Result<CreateMembersResponse, ProviderError> {
        self.region.create_members(request)
    }

    fn delete_members(
        &self,
        graph: &str,
        account_ids: &[String],
    ) -> Result<Vec<UnprocessedAccount>, ProviderError> {
        self.region.delete_members(graph, account_ids)
    }

    fn accept_invitation(&self, graph: &str) -> Result<(), ProviderError> {
        self.region.calls.borrow_mut().push(Call::AcceptInvitation {
            account: self.account.clone(),
            graph: graph.to_string(),
        });
        for member in self.region.members.borrow_mut().iter_mut() {
            if member.account_id == self.account {
                member.status = MemberStatus::Enabled;
            }
        }
        Ok(())
    }
}

/// Connector over a set of fake regions; the session is the account id.
#[derive(Default)]
pub struct FakeConnector {
    pub regions: BTreeMap<String, Rc<FakeGraph>>,
    pub deny_roles: BTreeSet<String>,
    pub assumed: RefCell<Vec<(String, String)>>,
}

impl FakeConnector {
    pub fn with_region(mut self, region: &str, graph: FakeGraph) -> Self {
        self.regions.insert(region.to_string(), Rc::new(graph));
        self
    }

    pub fn region(&self, region: &str) -> Rc<FakeGraph> {
        Rc::clone(&self.regions[region])
    }
}

impl Connector for FakeConnector {
    type Session = String;
    type Client = FakeClient;

    fn assume_role(
        &self,
        account_id: &str,
        _role_name: &str,
        session_label: &str,
    ) -> Result<Self::Session, ProviderError> {
        self.assumed
            .borrow_mut()
            .push((account_id.to_string(), session_label.to_string()));
        if self.deny_roles.contains(account_id) {
            return Err(ProviderError::Credentials(format!(
                "not authorized to assume role in {account_id}"
            )));
        }
        Ok(account_id.to_string())
    }

    fn client(&self, session: &Self::Session, region: &str) -> Self::Client {
        FakeClient {
            account: session.clone(),
            region: self.regions.get(region).cloned().unwrap_or_default(),
        }
    }

    fn available_regions(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingPause {
    pub pauses: RefCell<Vec<Duration>>,
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// Records observed events as `(scope, message)` pairs; the scope is the
/// graph for reconciler events and the region, if any, for run events.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: RefCell<Vec<(String, String)>>,
}

impl RecordingObserver {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|message| message.contains(needle))
    }

    /// Messages recorded under `scope`.
    pub fn scoped(&self, scope: &str) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(recorded, _)| recorded == scope)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl RunObserver for RecordingObserver {
    fn observe(&self, event: &EnrollEvent<'_>) {
        self.events
            .borrow_mut()
            .push((event.graph().to_string(), event.message()));
    }

    fn observe_run(&self, event: &RunEvent<'_>) {
        self.events.borrow_mut().push((
            event.region().unwrap_or_default().to_string(),
            event.message(),
        ));
    }
}

/// Acceptor that accepts through the fake graph directly.
pub struct DirectAcceptor<'a> {
    pub graph: &'a FakeGraph,
    pub refuse: BTreeSet<String>,
}

impl InvitationAcceptor for DirectAcceptor<'_> {
    fn accept(&self, account_id: &str, graph: &str) -> anyhow::Result<()> {
        if self.refuse.contains(account_id) {
            anyhow::bail!("role assumption refused for {account_id}");
        }
        self.graph.calls.borrow_mut().push(Call::AcceptInvitation {
            account: account_id.to_string(),
            graph: graph.to_string(),
        });
        Ok(())
    }
}

/// Confirmer that replays canned answers and remembers every prompt.
pub struct ScriptedConfirmer {
    pub answer: bool,
    pub prompts: RefCell<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self.answer)
    }
}
