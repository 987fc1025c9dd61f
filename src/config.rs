//! Run settings.
//!
//! Settings come from an optional JSON file; anything the file omits falls
//! back to the defaults below, which match the provider's documented limits.
use crate::chunk::MEMBER_BATCH_LIMIT;
use crate::membership::DEFAULT_LIST_PAGE_SIZE;
use crate::reconcile::ReconcileSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

const MAX_LIST_PAGE_SIZE: u32 = 200;

/// Tunable parameters for enrollment and decommission runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub schema_version: u32,
    /// Pause after member creation before the first membership query.
    pub propagation_wait_secs: u64,
    /// Pause between membership polls.
    pub poll_interval_secs: u64,
    /// Number of polls before unresolved accounts abort the run.
    pub poll_attempts: u32,
    /// Accounts per create/delete call.
    pub member_batch_size: usize,
    /// Members requested per listing page.
    pub list_page_size: u32,
    pub invitation_message: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            propagation_wait_secs: 10,
            poll_interval_secs: 30,
            poll_attempts: 6,
            member_batch_size: MEMBER_BATCH_LIMIT,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            invitation_message: "Automatically generated invitation".to_string(),
        }
    }
}

impl Settings {
    pub fn reconcile_settings(&self, disable_email: bool) -> ReconcileSettings {
        ReconcileSettings {
            propagation_wait: Duration::from_secs(self.propagation_wait_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            poll_attempts: self.poll_attempts,
            list_page_size: self.list_page_size,
            invitation_message: self.invitation_message.clone(),
            disable_email,
        }
    }
}

/// Render the default settings as pretty JSON, for use as an editable stub.
pub fn settings_stub() -> Result<String> {
    serde_json::to_string_pretty(&Settings::default()).context("serialize settings stub")
}

/// Load settings from `path`, or the defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let bytes = fs::read(path).with_context(|| format!("read settings {}", path.display()))?;
    let settings: Settings = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse settings JSON {}", path.display()))?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Reject settings the provider or the poll loop cannot work with.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.schema_version != SETTINGS_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported settings schema_version {}",
            settings.schema_version
        ));
    }
    if settings.member_batch_size == 0 || settings.member_batch_size > MEMBER_BATCH_LIMIT {
        return Err(anyhow!(
            "member_batch_size must be between 1 and {MEMBER_BATCH_LIMIT} (got {})",
            settings.member_batch_size
        ));
    }
    if settings.list_page_size == 0 || settings.list_page_size > MAX_LIST_PAGE_SIZE {
        return Err(anyhow!(
            "list_page_size must be between 1 and {MAX_LIST_PAGE_SIZE} (got {})",
            settings.list_page_size
        ));
    }
    if settings.invitation_message.trim().is_empty() {
        return Err(anyhow!("invitation_message must be non-empty"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
