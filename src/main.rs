use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

mod accounts;
mod aws;
mod chunk;
mod cli;
mod config;
mod decommission;
mod enroll;
mod logging;
mod membership;
mod observer;
mod prompt;
mod provider;
mod reconcile;
mod regions;
#[cfg(test)]
mod testing;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<ExitCode> {
    let args = RootArgs::parse();
    logging::init_logging(args.verbose());

    match args.command {
        Command::Enroll(args) => workflow::run_enroll(args),
        Command::Decommission(args) => workflow::run_decommission(args),
        Command::Config(args) => workflow::run_config(args),
    }
}
