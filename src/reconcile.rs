//! Enrollment reconciler.
//!
//! Brings one graph's membership in line with one roster chunk. Member
//! creation is fire-and-forget on an eventually consistent backend, so the
//! reconciler waits until every created account is visibly invited (or has
//! failed verification) before accepting anything, and gives up after a
//! bounded number of polls.
use crate::accounts::AccountRecord;
use crate::membership::{query_membership, MembershipSnapshot};
use crate::observer::{EnrollEvent, RunObserver};
use crate::provider::{CreateMembersRequest, GraphApi, NewMember, ProviderError};
use std::collections::BTreeSet;
use std::time::Duration;

/// Timing and request parameters for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub propagation_wait: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub list_page_size: u32,
    pub invitation_message: String,
    pub disable_email: bool,
}

/// Blocking pause between membership queries.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Accepts a graph invitation on behalf of a member account.
pub trait InvitationAcceptor {
    fn accept(&self, account_id: &str, graph: &str) -> anyhow::Result<()>;
}

/// What happened to the accounts of one chunk in one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentOutcome {
    /// Accounts the provider accepted for creation.
    pub created: BTreeSet<String>,
    /// Created accounts whose invitation never became visible.
    pub needs_recheck: BTreeSet<String>,
    /// Created accounts rejected for an id/contact mismatch.
    pub failed_verification: BTreeSet<String>,
}

impl EnrollmentOutcome {
    pub fn is_blocked(&self) -> bool {
        !self.needs_recheck.is_empty() || !self.failed_verification.is_empty()
    }
}

/// Result of reconciling one graph against one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Every desired account was already a member.
    NoChanges,
    /// Invitations were accepted for the pending accounts.
    Accepted {
        outcome: EnrollmentOutcome,
        accepted: BTreeSet<String>,
        acceptance_failed: BTreeSet<String>,
    },
    /// Some accounts could not be resolved; the run must stop.
    Blocked(EnrollmentOutcome),
}

/// Collaborators shared by every reconciliation in a region.
pub struct ReconcileContext<'a> {
    pub api: &'a dyn GraphApi,
    pub acceptor: &'a dyn InvitationAcceptor,
    pub pause: &'a dyn Pause,
    pub observer: &'a dyn RunObserver,
    pub settings: &'a ReconcileSettings,
}

/// Accounts in `desired` that are not yet members.
pub fn accounts_to_create<'r>(
    desired: &'r [AccountRecord],
    current: &BTreeSet<String>,
) -> Vec<&'r AccountRecord> {
    desired
        .iter()
        .filter(|record| !current.contains(&record.account_id))
        .collect()
}

impl ReconcileContext<'_> {
    /// Run the full create, wait, poll, decide sequence for one graph.
    pub fn reconcile(
        &self,
        graph: &str,
        desired: &[AccountRecord],
        current_all: &BTreeSet<String>,
    ) -> Result<Reconciliation, ProviderError> {
        let to_create = accounts_to_create(desired, current_all);
        if to_create.is_empty() {
            self.observer
                .observe(&EnrollEvent::NothingToCreate { graph });
            return Ok(Reconciliation::NoChanges);
        }

        let created = self.submit(graph, &to_create)?;

        self.observer.observe(&EnrollEvent::PropagationWait {
            graph,
            wait: self.settings.propagation_wait,
        });
        self.pause.pause(self.settings.propagation_wait);

        let mut snapshot = self.refresh(graph)?;
        let mut recheck = created.clone();
        let mut verification_pending = BTreeSet::new();
        settle(&snapshot, &mut recheck, &mut verification_pending);

        let mut attempts_left = self.settings.poll_attempts;
        while !recheck.is_empty() && attempts_left > 0 {
            self.observer.observe(&EnrollEvent::AwaitingInvitations {
                graph,
                accounts: &recheck,
                wait: self.settings.poll_interval,
                attempts_left,
            });
            self.pause.pause(self.settings.poll_interval);
            attempts_left -= 1;
            snapshot = self.refresh(graph)?;
            settle(&snapshot, &mut recheck, &mut verification_pending);
        }

        let outcome = EnrollmentOutcome {
            created,
            needs_recheck: recheck,
            failed_verification: verification_pending,
        };
        if !outcome.needs_recheck.is_empty() {
            self.observer.observe(&EnrollEvent::NeedsRecheck {
                graph,
                accounts: &outcome.needs_recheck,
            });
        }
        if !outcome.failed_verification.is_empty() {
            self.observer.observe(&EnrollEvent::NeedsVerification {
                graph,
                accounts: &outcome.failed_verification,
            });
        }
        if outcome.is_blocked() {
            self.observer.observe(&EnrollEvent::Blocked { graph });
            return Ok(Reconciliation::Blocked(outcome));
        }

        let (accepted, acceptance_failed) = self.accept_pending(graph, &snapshot.pending_invited);
        Ok(Reconciliation::Accepted {
            outcome,
            accepted,
            acceptance_failed,
        })
    }

    fn submit(
        &self,
        graph: &str,
        to_create: &[&AccountRecord],
    ) -> Result<BTreeSet<String>, ProviderError> {
        let requested: BTreeSet<String> = to_create
            .iter()
            .map(|record| record.account_id.clone())
            .collect();
        self.observer.observe(&EnrollEvent::CreatingMembers {
            graph,
            accounts: &requested,
        });
        let request = CreateMembersRequest {
            graph,
            message: &self.settings.invitation_message,
            accounts: to_create
                .iter()
                .map(|record| NewMember {
                    account_id: &record.account_id,
                    contact_address: &record.contact_address,
                })
                .collect(),
            disable_email: self.settings.disable_email,
        };
        let response = self.api.create_members(&request)?;
        for unprocessed in &response.unprocessed {
            self.observer.observe(&EnrollEvent::Unprocessed {
                graph,
                account_id: &unprocessed.account_id,
                reason: &unprocessed.reason,
            });
        }
        Ok(response.created.into_iter().collect())
    }

    fn refresh(&self, graph: &str) -> Result<MembershipSnapshot, ProviderError> {
        query_membership(self.api, graph, self.settings.list_page_size, self.observer)
    }

    fn accept_pending(
        &self,
        graph: &str,
        pending: &BTreeSet<String>,
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut accepted = BTreeSet::new();
        let mut failed = BTreeSet::new();
        for account_id in pending {
            self.observer
                .observe(&EnrollEvent::Accepting { graph, account_id });
            match self.acceptor.accept(account_id, graph) {
                Ok(()) => {
                    accepted.insert(account_id.clone());
                }
                Err(err) => {
                    let detail = format!("{err:#}");
                    self.observer.observe(&EnrollEvent::AcceptFailed {
                        graph,
                        account_id,
                        detail: &detail,
                    });
                    failed.insert(account_id.clone());
                }
            }
        }
        (accepted, failed)
    }
}

/// Drop accounts whose invitation is visible and move verification failures
/// out of the recheck set.
fn settle(
    snapshot: &MembershipSnapshot,
    recheck: &mut BTreeSet<String>,
    verification_pending: &mut BTreeSet<String>,
) {
    recheck.retain(|account_id| {
        if snapshot.pending_invited.contains(account_id) {
            return false;
        }
        if snapshot.verification_failed.contains(account_id) {
            verification_pending.insert(account_id.clone());
            return false;
        }
        true
    });
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
