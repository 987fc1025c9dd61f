//! Command entry points.
//!
//! Each `run_*` function loads settings and inputs, connects to the provider,
//! resolves regions and the admin session, then hands off to the matching
//! driver. Anything that fails here happens before a region is touched and
//! ends the run with an error.
use crate::accounts::{read_roster, Roster};
use crate::aws::AwsConnector;
use crate::cli::{ConfigArgs, DecommissionArgs, EnrollArgs, SessionArgs};
use crate::config::{load_settings, settings_stub, Settings};
use crate::decommission::{
    Decommission, DecommissionMode, DecommissionSummary, DECOMMISSION_SESSION_LABEL,
};
use crate::enroll::{Enrollment, RunOutcome, ENROLL_SESSION_LABEL};
use crate::observer::{RunObserver, TracingObserver};
use crate::prompt::{confirmer, Confirmer};
use crate::provider::Connector;
use crate::reconcile::{Pause, ThreadPause};
use crate::regions::select_regions;
use anyhow::{Context, Result};
use std::process::ExitCode;
use std::time::Instant;

const NOTHING_CHANGED: &str = "Execution finished without modifying any member.";
/// Process status for a run that stopped on unresolved accounts.
const ABORTED_STATUS: u8 = 1;

pub fn run_config(_args: ConfigArgs) -> Result<ExitCode> {
    println!("{}", settings_stub()?);
    Ok(ExitCode::SUCCESS)
}

pub fn run_enroll(args: EnrollArgs) -> Result<ExitCode> {
    let started = Instant::now();
    let settings = load_settings(args.session.config.as_deref())?;
    let roster = read_roster(&args.input_file)?;
    if roster.is_empty() {
        tracing::warn!(
            path = %args.input_file.display(),
            "no valid accounts in roster; nothing to enroll"
        );
        return Ok(ExitCode::SUCCESS);
    }
    let connector = AwsConnector::from_environment()?;
    let confirmer = confirmer(args.session.skip_prompt);
    let outcome = enroll_with(
        &connector,
        &args,
        &settings,
        &roster,
        confirmer.as_ref(),
        &ThreadPause,
        &TracingObserver,
    )?;
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis(),
        accounts = roster.len(),
        "enroll complete"
    );
    Ok(ExitCode::from(enroll_status(outcome.as_ref())))
}

/// Process status for an enrollment outcome; only an aborted run fails.
pub(crate) fn enroll_status(outcome: Option<&RunOutcome>) -> u8 {
    match outcome {
        Some(RunOutcome::Aborted { region, graph, .. }) => {
            tracing::error!(
                region = region.as_str(),
                graph = graph.as_str(),
                "enrollment stopped; resolve the accounts above and rerun"
            );
            ABORTED_STATUS
        }
        Some(RunOutcome::Completed) | None => 0,
    }
}

/// Enroll `roster`; `None` means the operator declined the region prompt.
pub(crate) fn enroll_with<C: Connector>(
    connector: &C,
    args: &EnrollArgs,
    settings: &Settings,
    roster: &Roster,
    confirmer: &dyn Confirmer,
    pause: &dyn Pause,
    observer: &dyn RunObserver,
) -> Result<Option<RunOutcome>> {
    let Some(regions) = select_regions(
        &args.session.regions,
        &connector.available_regions(),
        confirmer,
    )?
    else {
        tracing::info!("{NOTHING_CHANGED}");
        return Ok(None);
    };
    let admin_session = admin_session(connector, &args.session, ENROLL_SESSION_LABEL)?;
    let tags = args.tags.clone().unwrap_or_default();
    let reconcile = settings.reconcile_settings(args.disable_email);
    let enrollment = Enrollment {
        connector,
        admin_session: &admin_session,
        role_name: &args.session.assume_role,
        regions: &regions,
        tags: &tags,
        batch_size: settings.member_batch_size,
        settings: &reconcile,
        confirmer,
        pause,
        observer,
    };
    Ok(Some(enrollment.run(roster)))
}

pub fn run_decommission(args: DecommissionArgs) -> Result<ExitCode> {
    let started = Instant::now();
    if args.input_file.is_none() && !args.delete_graph {
        tracing::error!("decommission needs --input-file or --delete-graph");
        return Ok(ExitCode::from(1));
    }
    let settings = load_settings(args.session.config.as_deref())?;
    let roster = match &args.input_file {
        Some(path) => read_roster(path)?,
        None => Roster::default(),
    };
    let mode = if args.delete_graph {
        DecommissionMode::DeleteGraph
    } else {
        DecommissionMode::UnlinkMembers
    };
    if mode == DecommissionMode::UnlinkMembers && roster.is_empty() {
        tracing::error!("no valid accounts in roster; nothing to remove");
        return Ok(ExitCode::from(1));
    }
    let connector = AwsConnector::from_environment()?;
    let confirmer = confirmer(args.session.skip_prompt);
    let summary = decommission_with(
        &connector,
        &args.session,
        &settings,
        &roster,
        mode,
        confirmer.as_ref(),
        &TracingObserver,
    )?;
    if let Some(summary) = summary {
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis(),
            regions_failed = summary.regions_failed,
            "decommission complete"
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Decommission in the selected regions; `None` means the operator declined.
pub(crate) fn decommission_with<C: Connector>(
    connector: &C,
    session: &SessionArgs,
    settings: &Settings,
    roster: &Roster,
    mode: DecommissionMode,
    confirmer: &dyn Confirmer,
    observer: &dyn RunObserver,
) -> Result<Option<DecommissionSummary>> {
    let Some(regions) =
        select_regions(&session.regions, &connector.available_regions(), confirmer)?
    else {
        tracing::info!("{NOTHING_CHANGED}");
        return Ok(None);
    };
    let admin_session = admin_session(connector, session, DECOMMISSION_SESSION_LABEL)?;
    let decommission = Decommission {
        connector,
        admin_session: &admin_session,
        regions: &regions,
        batch_size: settings.member_batch_size,
        observer,
    };
    Ok(Some(decommission.run(mode, roster)))
}

fn admin_session<C: Connector>(
    connector: &C,
    session: &SessionArgs,
    label: &str,
) -> Result<C::Session> {
    connector
        .assume_role(&session.admin_account, &session.assume_role, label)
        .with_context(|| {
            format!(
                "assume role {} in admin account {}",
                session.assume_role, session.admin_account
            )
        })
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
