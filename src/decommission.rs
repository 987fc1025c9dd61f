//! Decommission: unlink roster accounts from every graph, or delete the graphs.
//!
//! Work is best-effort. A failed region, graph or batch is reported to the
//! observer and the run moves on to the next one.
use crate::accounts::Roster;
use crate::chunk::chunked;
use crate::observer::{RunEvent, RunObserver};
use crate::provider::{list_graphs_or_empty, Connector, GraphApi};
use anyhow::{Context, Result};

pub const DECOMMISSION_SESSION_LABEL: &str = "GraphLink_Decommission";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecommissionMode {
    /// Remove the roster's accounts from each graph.
    UnlinkMembers,
    /// Delete each graph outright, which implicitly removes every member.
    DeleteGraph,
}

/// Counters for the closing summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecommissionSummary {
    pub regions_failed: usize,
    pub graphs_deleted: usize,
    pub members_removed: usize,
    pub unprocessed: usize,
}

pub struct Decommission<'a, C: Connector> {
    pub connector: &'a C,
    pub admin_session: &'a C::Session,
    pub regions: &'a [String],
    pub batch_size: usize,
    pub observer: &'a dyn RunObserver,
}

impl<C: Connector> Decommission<'_, C> {
    pub fn run(&self, mode: DecommissionMode, roster: &Roster) -> DecommissionSummary {
        let account_ids: Vec<String> = roster
            .records()
            .iter()
            .map(|record| record.account_id.clone())
            .collect();
        let mut summary = DecommissionSummary::default();
        for region in self.regions {
            let client = self.connector.client(self.admin_session, region);
            let result = match mode {
                DecommissionMode::UnlinkMembers => {
                    self.unlink_region(&client, region, &account_ids, &mut summary)
                }
                DecommissionMode::DeleteGraph => self.delete_region(&client, region, &mut summary),
            };
            if let Err(err) = result {
                summary.regions_failed += 1;
                self.observer.observe_run(&RunEvent::RegionFailed {
                    region,
                    detail: &format!("{err:#}"),
                });
            }
        }
        self.observer.observe_run(&RunEvent::DecommissionFinished {
            regions: self.regions.len(),
            summary: &summary,
        });
        summary
    }

    fn region_graphs(&self, client: &C::Client, region: &str) -> Result<Vec<String>> {
        let graphs = list_graphs_or_empty(client, region)
            .with_context(|| format!("list graphs in {region}"))?;
        if graphs.is_empty() {
            self.observer
                .observe_run(&RunEvent::GraphAlreadyDisabled { region });
        }
        Ok(graphs)
    }

    fn unlink_region(
        &self,
        client: &C::Client,
        region: &str,
        account_ids: &[String],
        summary: &mut DecommissionSummary,
    ) -> Result<()> {
        for graph in self.region_graphs(client, region)? {
            self.observer.observe_run(&RunEvent::RemovingMembers {
                region,
                graph: &graph,
            });
            for batch in chunked(account_ids, self.batch_size) {
                let batch: Vec<String> = batch.into_iter().cloned().collect();
                match client.delete_members(&graph, &batch) {
                    Ok(unprocessed) => {
                        summary.members_removed += batch.len().saturating_sub(unprocessed.len());
                        summary.unprocessed += unprocessed.len();
                        for account in &unprocessed {
                            self.observer.observe_run(&RunEvent::RemovalUnprocessed {
                                region,
                                graph: &graph,
                                account_id: &account.account_id,
                                reason: &account.reason,
                            });
                        }
                    }
                    Err(err) => self.observer.observe_run(&RunEvent::RemovalFailed {
                        region,
                        graph: &graph,
                        accounts: batch.len(),
                        detail: &err.to_string(),
                    }),
                }
            }
        }
        Ok(())
    }

    fn delete_region(
        &self,
        client: &C::Client,
        region: &str,
        summary: &mut DecommissionSummary,
    ) -> Result<()> {
        for graph in self.region_graphs(client, region)? {
            match client.delete_graph(&graph) {
                Ok(()) => {
                    summary.graphs_deleted += 1;
                    self.observer.observe_run(&RunEvent::GraphDeleted {
                        region,
                        graph: &graph,
                    });
                }
                Err(err) => self.observer.observe_run(&RunEvent::GraphDeleteFailed {
                    region,
                    graph: &graph,
                    detail: &err.to_string(),
                }),
            }
        }
        Ok(())
    }
}
