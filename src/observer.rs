//! Run events and the observers that report them.
//!
//! The reconciler, the enrollment and decommission drivers, and the membership
//! query never log operator-facing lines directly; they hand every decision to
//! a [`RunObserver`]. Production runs use [`TracingObserver`], tests record
//! the events and assert on them.
use crate::decommission::DecommissionSummary;
use crate::util::join_ids;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Decisions taken while reconciling one graph.
#[derive(Debug, Clone)]
pub enum EnrollEvent<'a> {
    NothingToCreate {
        graph: &'a str,
    },
    CreatingMembers {
        graph: &'a str,
        accounts: &'a BTreeSet<String>,
    },
    Unprocessed {
        graph: &'a str,
        account_id: &'a str,
        reason: &'a str,
    },
    PropagationWait {
        graph: &'a str,
        wait: Duration,
    },
    AwaitingInvitations {
        graph: &'a str,
        accounts: &'a BTreeSet<String>,
        wait: Duration,
        attempts_left: u32,
    },
    NeedsRecheck {
        graph: &'a str,
        accounts: &'a BTreeSet<String>,
    },
    NeedsVerification {
        graph: &'a str,
        accounts: &'a BTreeSet<String>,
    },
    Blocked {
        graph: &'a str,
    },
    Accepting {
        graph: &'a str,
        account_id: &'a str,
    },
    AcceptFailed {
        graph: &'a str,
        account_id: &'a str,
        detail: &'a str,
    },
}

/// Severity an event is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl EnrollEvent<'_> {
    pub fn graph(&self) -> &str {
        match self {
            EnrollEvent::NothingToCreate { graph }
            | EnrollEvent::CreatingMembers { graph, .. }
            | EnrollEvent::Unprocessed { graph, .. }
            | EnrollEvent::PropagationWait { graph, .. }
            | EnrollEvent::AwaitingInvitations { graph, .. }
            | EnrollEvent::NeedsRecheck { graph, .. }
            | EnrollEvent::NeedsVerification { graph, .. }
            | EnrollEvent::Blocked { graph }
            | EnrollEvent::Accepting { graph, .. }
            | EnrollEvent::AcceptFailed { graph, .. } => *graph,
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            EnrollEvent::Unprocessed { .. } | EnrollEvent::AcceptFailed { .. } => {
                EventLevel::Error
            }
            EnrollEvent::NeedsRecheck { .. }
            | EnrollEvent::NeedsVerification { .. }
            | EnrollEvent::Blocked { .. } => EventLevel::Warn,
            _ => EventLevel::Info,
        }
    }

    /// Operator-facing message for this event.
    pub fn message(&self) -> String {
        match self {
            EnrollEvent::NothingToCreate { graph } => {
                format!("no new members to create in graph {graph}")
            }
            EnrollEvent::CreatingMembers { graph, accounts } => format!(
                "creating member accounts in graph {graph} for accounts {}",
                join_ids(*accounts)
            ),
            EnrollEvent::Unprocessed {
                graph,
                account_id,
                reason,
            } => format!("could not create member for account {account_id} in graph {graph}: {reason}"),
            EnrollEvent::PropagationWait { wait, .. } => format!(
                "sleeping for {}s to allow new members' invitations to propagate",
                wait.as_secs()
            ),
            EnrollEvent::AwaitingInvitations {
                accounts,
                wait,
                attempts_left,
                ..
            } => format!(
                "not invited accounts found: waiting {}s for {} ({attempts_left} attempts left)",
                wait.as_secs(),
                join_ids(*accounts)
            ),
            EnrollEvent::NeedsRecheck { accounts, .. } => {
                format!("please recheck accounts {}", join_ids(*accounts))
            }
            EnrollEvent::NeedsVerification { accounts, .. } => format!(
                "please verify account information for accounts {}",
                join_ids(*accounts)
            ),
            EnrollEvent::Blocked { .. } => "please verify provided information for the accounts listed above \
                 and run again with all accounts for invitation acceptance"
                .to_string(),
            EnrollEvent::Accepting { graph, account_id } => {
                format!("accepting invitation for account {account_id} in graph {graph}")
            }
            EnrollEvent::AcceptFailed {
                account_id, detail, ..
            } => format!("error accepting invitation for account {account_id}: {detail}"),
        }
    }
}

/// Progress of the drivers around the reconciler.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    ChunkStarted {
        chunk: usize,
        accounts: usize,
    },
    RegionFailed {
        region: &'a str,
        detail: &'a str,
    },
    RegionSkipped {
        region: &'a str,
    },
    EnablingGraph {
        region: &'a str,
        tags: &'a BTreeMap<String, String>,
    },
    GraphEnabled {
        region: &'a str,
        graph: &'a str,
    },
    GraphReconciled {
        region: &'a str,
        graph: &'a str,
        accepted: usize,
        acceptance_failed: usize,
    },
    GraphFailed {
        region: &'a str,
        graph: &'a str,
        detail: &'a str,
    },
    MembersListed {
        graph: &'a str,
        pages: usize,
        members: usize,
    },
    GraphAlreadyDisabled {
        region: &'a str,
    },
    RemovingMembers {
        region: &'a str,
        graph: &'a str,
    },
    RemovalUnprocessed {
        region: &'a str,
        graph: &'a str,
        account_id: &'a str,
        reason: &'a str,
    },
    RemovalFailed {
        region: &'a str,
        graph: &'a str,
        accounts: usize,
        detail: &'a str,
    },
    GraphDeleted {
        region: &'a str,
        graph: &'a str,
    },
    GraphDeleteFailed {
        region: &'a str,
        graph: &'a str,
        detail: &'a str,
    },
    DecommissionFinished {
        regions: usize,
        summary: &'a DecommissionSummary,
    },
}

impl RunEvent<'_> {
    pub fn region(&self) -> Option<&str> {
        match self {
            RunEvent::RegionFailed { region, .. }
            | RunEvent::RegionSkipped { region }
            | RunEvent::EnablingGraph { region, .. }
            | RunEvent::GraphEnabled { region, .. }
            | RunEvent::GraphReconciled { region, .. }
            | RunEvent::GraphFailed { region, .. }
            | RunEvent::GraphAlreadyDisabled { region }
            | RunEvent::RemovingMembers { region, .. }
            | RunEvent::RemovalUnprocessed { region, .. }
            | RunEvent::RemovalFailed { region, .. }
            | RunEvent::GraphDeleted { region, .. }
            | RunEvent::GraphDeleteFailed { region, .. } => Some(region),
            RunEvent::ChunkStarted { .. }
            | RunEvent::MembersListed { .. }
            | RunEvent::DecommissionFinished { .. } => None,
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            RunEvent::MembersListed { .. } => EventLevel::Debug,
            RunEvent::RemovalUnprocessed { .. } => EventLevel::Warn,
            RunEvent::RegionFailed { .. }
            | RunEvent::GraphFailed { .. }
            | RunEvent::RemovalFailed { .. }
            | RunEvent::GraphDeleteFailed { .. } => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RunEvent::ChunkStarted { chunk, accounts } => {
                format!("processing roster chunk {chunk} ({accounts} accounts)")
            }
            RunEvent::RegionFailed { detail, .. } => format!("error with region: {detail}"),
            RunEvent::RegionSkipped { .. } => "skipping region".to_string(),
            RunEvent::EnablingGraph { tags, .. } if tags.is_empty() => "enabling graph".to_string(),
            RunEvent::EnablingGraph { tags, .. } => format!("enabling graph with tags {tags:?}"),
            RunEvent::GraphEnabled { graph, .. } => format!("graph {graph} enabled"),
            RunEvent::GraphReconciled {
                graph,
                accepted,
                acceptance_failed,
                ..
            } => format!(
                "graph {graph} reconciled: {accepted} accepted, {acceptance_failed} acceptance failures"
            ),
            RunEvent::GraphFailed { graph, detail, .. } => {
                format!("unable to reconcile graph {graph}: {detail}")
            }
            RunEvent::MembersListed {
                graph,
                pages,
                members,
            } => format!("listed {members} members of graph {graph} in {pages} pages"),
            RunEvent::GraphAlreadyDisabled { .. } => "graph already disabled".to_string(),
            RunEvent::RemovingMembers { graph, .. } => format!("removing members from graph {graph}"),
            RunEvent::RemovalUnprocessed {
                graph,
                account_id,
                reason,
                ..
            } => format!("could not remove account {account_id} from graph {graph}: {reason}"),
            RunEvent::RemovalFailed {
                graph,
                accounts,
                detail,
                ..
            } => format!("unable to remove member batch of {accounts} from graph {graph}: {detail}"),
            RunEvent::GraphDeleted { graph, .. } => format!("graph {graph} deleted"),
            RunEvent::GraphDeleteFailed { graph, detail, .. } => {
                format!("unable to delete graph {graph}: {detail}")
            }
            RunEvent::DecommissionFinished { regions, summary } => format!(
                "decommission finished in {regions} regions: {} failed, {} graphs deleted, \
                 {} members removed, {} unprocessed",
                summary.regions_failed,
                summary.graphs_deleted,
                summary.members_removed,
                summary.unprocessed
            ),
        }
    }
}

/// Sink for run events.
pub trait RunObserver {
    fn observe(&self, event: &EnrollEvent<'_>);
    fn observe_run(&self, event: &RunEvent<'_>);
}

/// Reports events as tracing log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn observe(&self, event: &EnrollEvent<'_>) {
        let graph = event.graph();
        let message = event.message();
        match event.level() {
            EventLevel::Debug => tracing::debug!(graph, "{message}"),
            EventLevel::Info => tracing::info!(graph, "{message}"),
            EventLevel::Warn => tracing::warn!(graph, "{message}"),
            EventLevel::Error => tracing::error!(graph, "{message}"),
        }
    }

    fn observe_run(&self, event: &RunEvent<'_>) {
        let message = event.message();
        match (event.level(), event.region()) {
            (EventLevel::Debug, _) => tracing::debug!("{message}"),
            (EventLevel::Info, Some(region)) => tracing::info!(region, "{message}"),
            (EventLevel::Info, None) => tracing::info!("{message}"),
            (EventLevel::Warn, Some(region)) => tracing::warn!(region, "{message}"),
            (EventLevel::Warn, None) => tracing::warn!("{message}"),
            (EventLevel::Error, Some(region)) => tracing::error!(region, "{message}"),
            (EventLevel::Error, None) => tracing::error!("{message}"),
        }
    }
}
