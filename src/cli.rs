//! CLI argument parsing for the enroll/decommission entry points.
use crate::accounts::is_account_id;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "graphlink",
    version,
    about = "Link member accounts to a central security behavior graph, region by region",
    after_help = "Examples:\n  graphlink enroll --admin-account 555555555555 --assume-role graphAdmin --regions us-east-1,us-west-2 --input-file accounts.csv\n  graphlink decommission --admin-account 555555555555 --assume-role graphAdmin --input-file accounts.csv --skip-prompt\n  graphlink decommission --admin-account 555555555555 --assume-role graphAdmin --delete-graph\n  graphlink config > settings.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

impl RootArgs {
    /// Whether the selected subcommand asked for debug output.
    pub fn verbose(&self) -> bool {
        match &self.command {
            Command::Enroll(args) => args.session.verbose,
            Command::Decommission(args) => args.session.verbose,
            Command::Config(_) => false,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Enroll(EnrollArgs),
    Decommission(DecommissionArgs),
    Config(ConfigArgs),
}

/// Inputs shared by both graph-changing commands.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Account id of the central (admin) account
    #[arg(long, value_name = "ACCOUNT_ID", value_parser = parse_account_id)]
    pub admin_account: String,

    /// Role name to assume in the admin account and in each member account
    #[arg(long, value_name = "ROLE")]
    pub assume_role: String,

    /// Comma-separated regions to act in (default: every available region)
    #[arg(long, value_name = "REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Answer yes to every confirmation prompt
    #[arg(long)]
    pub skip_prompt: bool,

    /// JSON settings file overriding poll timings and batch sizes
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit debug-level log lines
    #[arg(long)]
    pub verbose: bool,
}

/// Enroll command inputs.
#[derive(Parser, Debug)]
#[command(about = "Invite roster accounts into each region's graph and accept on their behalf")]
pub struct EnrollArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// CSV of `account_id,contact_address` rows
    #[arg(long, value_name = "PATH")]
    pub input_file: PathBuf,

    /// Do not send invitation emails to member accounts
    #[arg(long)]
    pub disable_email: bool,

    /// Tags for newly created graphs, as `key=value,key2=value2` (value optional)
    #[arg(long, value_name = "TAGS", value_parser = parse_tags)]
    pub tags: Option<BTreeMap<String, String>>,
}

/// Decommission command inputs.
#[derive(Parser, Debug)]
#[command(about = "Remove roster accounts from each region's graph, or delete the graph")]
pub struct DecommissionArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// CSV of `account_id,contact_address` rows (not needed with --delete-graph)
    #[arg(long, value_name = "PATH")]
    pub input_file: Option<PathBuf>,

    /// Delete the admin account's graph in each region
    #[arg(long)]
    pub delete_graph: bool,
}

/// Config command inputs.
#[derive(Parser, Debug)]
#[command(about = "Print the default settings as JSON")]
pub struct ConfigArgs {}

fn parse_account_id(raw: &str) -> Result<String, String> {
    if is_account_id(raw) {
        Ok(raw.to_string())
    } else {
        Err(format!("{raw:?} is not a 12-digit account id"))
    }
}

/// Parse `key=value` pairs; a key without `=` maps to an empty value.
pub fn parse_tags(raw: &str) -> Result<BTreeMap<String, String>, String> {
    let mut tags = BTreeMap::new();
    for pair in raw.split(',') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            return Err(format!("tag entry {pair:?} has an empty key"));
        }
        tags.insert(key.to_string(), value.to_string());
    }
    Ok(tags)
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
