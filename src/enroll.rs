//! Enrollment driver: roster chunks × regions × graphs.
//!
//! Each roster chunk gets its own pass over every region. Failures local to a
//! region or graph are logged and the pass moves on; a blocked
//! reconciliation ends the whole run.
use crate::accounts::{AccountRecord, Roster};
use crate::chunk::chunked;
use crate::membership::query_memberships;
use crate::observer::{RunEvent, RunObserver};
use crate::prompt::Confirmer;
use crate::provider::{list_graphs_or_empty, Connector, GraphApi};
use crate::reconcile::{
    EnrollmentOutcome, InvitationAcceptor, Pause, ReconcileContext, ReconcileSettings,
    Reconciliation,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;

pub const ENROLL_SESSION_LABEL: &str = "GraphLink_Enroll";
pub const ACCEPT_SESSION_LABEL: &str = "GraphLink_AcceptInvitations";

/// How an enrollment run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A graph had accounts that never resolved; nothing further was touched.
    Aborted {
        region: String,
        graph: String,
        outcome: EnrollmentOutcome,
    },
}

/// Everything an enrollment run needs besides the roster.
pub struct Enrollment<'a, C: Connector> {
    pub connector: &'a C,
    pub admin_session: &'a C::Session,
    pub role_name: &'a str,
    pub regions: &'a [String],
    pub tags: &'a BTreeMap<String, String>,
    pub batch_size: usize,
    pub settings: &'a ReconcileSettings,
    pub confirmer: &'a dyn Confirmer,
    pub pause: &'a dyn Pause,
    pub observer: &'a dyn RunObserver,
}

impl<C: Connector> Enrollment<'_, C> {
    pub fn run(&self, roster: &Roster) -> RunOutcome {
        for (index, chunk) in chunked(roster.records(), self.batch_size).enumerate() {
            let chunk: Vec<AccountRecord> = chunk.into_iter().cloned().collect();
            self.observer.observe_run(&RunEvent::ChunkStarted {
                chunk: index + 1,
                accounts: chunk.len(),
            });
            for region in self.regions {
                match self.enroll_region(region, &chunk) {
                    Ok(None) => {}
                    Ok(Some(aborted)) => return aborted,
                    Err(err) => self.observer.observe_run(&RunEvent::RegionFailed {
                        region,
                        detail: &format!("{err:#}"),
                    }),
                }
            }
        }
        RunOutcome::Completed
    }

    fn enroll_region(&self, region: &str, chunk: &[AccountRecord]) -> Result<Option<RunOutcome>> {
        let client = self.connector.client(self.admin_session, region);
        let Some(graphs) = self.ensure_graphs(&client, region)? else {
            return Ok(None);
        };
        let memberships = query_memberships(
            &client,
            &graphs,
            self.settings.list_page_size,
            self.observer,
        )
        .with_context(|| format!("list graph members in {region}"))?;

        let acceptor = SessionAcceptor {
            connector: self.connector,
            role_name: self.role_name,
            region,
        };
        let context = ReconcileContext {
            api: &client,
            acceptor: &acceptor,
            pause: self.pause,
            observer: self.observer,
            settings: self.settings,
        };
        for (graph, snapshot) in &memberships {
            match context.reconcile(graph, chunk, &snapshot.all) {
                Ok(Reconciliation::NoChanges) => {}
                Ok(Reconciliation::Accepted {
                    accepted,
                    acceptance_failed,
                    ..
                }) => self.observer.observe_run(&RunEvent::GraphReconciled {
                    region,
                    graph,
                    accepted: accepted.len(),
                    acceptance_failed: acceptance_failed.len(),
                }),
                Ok(Reconciliation::Blocked(outcome)) => {
                    return Ok(Some(RunOutcome::Aborted {
                        region: region.to_string(),
                        graph: graph.clone(),
                        outcome,
                    }));
                }
                Err(err) => self.observer.observe_run(&RunEvent::GraphFailed {
                    region,
                    graph,
                    detail: &err.to_string(),
                }),
            }
        }
        Ok(None)
    }

    /// Graphs to enroll into, creating one when the region has none.
    fn ensure_graphs(&self, client: &C::Client, region: &str) -> Result<Option<Vec<String>>> {
        let graphs = list_graphs_or_empty(client, region)
            .with_context(|| format!("list graphs in {region}"))?;
        if !graphs.is_empty() {
            return Ok(Some(graphs));
        }
        let prompt = format!("Should the graph be enabled in {region}?");
        if !self.confirmer.confirm(&prompt)? {
            self.observer.observe_run(&RunEvent::RegionSkipped { region });
            return Ok(None);
        }
        self.observer.observe_run(&RunEvent::EnablingGraph {
            region,
            tags: self.tags,
        });
        let graph = client
            .create_graph(self.tags)
            .with_context(|| format!("create graph in {region}"))?;
        self.observer.observe_run(&RunEvent::GraphEnabled {
            region,
            graph: &graph,
        });
        Ok(Some(vec![graph]))
    }
}

/// Accepts invitations under each member account's own assumed role.
struct SessionAcceptor<'a, C: Connector> {
    connector: &'a C,
    role_name: &'a str,
    region: &'a str,
}

impl<C: Connector> InvitationAcceptor for SessionAcceptor<'_, C> {
    fn accept(&self, account_id: &str, graph: &str) -> Result<()> {
        let session = self
            .connector
            .assume_role(account_id, self.role_name, ACCEPT_SESSION_LABEL)
            .with_context(|| format!("assume role {} in {account_id}", self.role_name))?;
        self.connector
            .client(&session, self.region)
            .accept_invitation(graph)
            .with_context(|| format!("accept invitation for {account_id} in {graph}"))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "enroll_tests.rs"]
mod tests;
