//! Membership query: one paginated listing partitioned by status.
use crate::observer::{RunEvent, RunObserver};
use crate::provider::{GraphApi, MemberDetail, MemberStatus, ProviderError};
use std::collections::{BTreeMap, BTreeSet};

/// Default page size for member listings.
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 100;

/// Status partition of a graph's members.
///
/// `pending_invited` and `verification_failed` are disjoint subsets of `all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub all: BTreeSet<String>,
    pub pending_invited: BTreeSet<String>,
    pub verification_failed: BTreeSet<String>,
}

impl MembershipSnapshot {
    /// Classify listed members in a single pass.
    pub fn classify<'a>(members: impl IntoIterator<Item = &'a MemberDetail>) -> Self {
        let mut snapshot = Self::default();
        for member in members {
            snapshot.all.insert(member.account_id.clone());
            match member.status {
                MemberStatus::Invited => {
                    snapshot.pending_invited.insert(member.account_id.clone());
                }
                MemberStatus::VerificationFailed => {
                    snapshot.verification_failed.insert(member.account_id.clone());
                }
                _ => {}
            }
        }
        // A listing that repeats an account with conflicting statuses keeps
        // the failure; the partitions stay disjoint.
        for account_id in &snapshot.verification_failed {
            snapshot.pending_invited.remove(account_id);
        }
        snapshot
    }
}

/// List every member of `graph`, following continuation tokens.
pub fn list_all_members<A: GraphApi + ?Sized>(
    api: &A,
    graph: &str,
    page_size: u32,
    observer: &dyn RunObserver,
) -> Result<Vec<MemberDetail>, ProviderError> {
    let mut members = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;
    loop {
        let page = api.list_members(graph, page_size, next_token.as_deref())?;
        pages += 1;
        members.extend(page.members);
        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }
    observer.observe_run(&RunEvent::MembersListed {
        graph,
        pages,
        members: members.len(),
    });
    Ok(members)
}

/// Partition the membership of one graph.
pub fn query_membership<A: GraphApi + ?Sized>(
    api: &A,
    graph: &str,
    page_size: u32,
    observer: &dyn RunObserver,
) -> Result<MembershipSnapshot, ProviderError> {
    let members = list_all_members(api, graph, page_size, observer)?;
    Ok(MembershipSnapshot::classify(&members))
}

/// Partition the membership of several graphs, keyed by graph id.
pub fn query_memberships<A, S>(
    api: &A,
    graphs: &[S],
    page_size: u32,
    observer: &dyn RunObserver,
) -> Result<BTreeMap<String, MembershipSnapshot>, ProviderError>
where
    A: GraphApi + ?Sized,
    S: AsRef<str>,
{
    graphs
        .iter()
        .map(|graph| {
            let graph = graph.as_ref();
            query_membership(api, graph, page_size, observer)
                .map(|snapshot| (graph.to_string(), snapshot))
        })
        .collect()
}

#[cfg(test)]
#[path = "membership_tests.rs"]
mod tests;
