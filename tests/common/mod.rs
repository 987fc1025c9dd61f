//! Shared test infrastructure for integration tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Credential and region variables cleared before every run so no test can
/// reach a real account.
const AWS_ENV: [&str; 14] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_PROFILE",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "AWS_WEB_IDENTITY_TOKEN_FILE",
    "AWS_ROLE_ARN",
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
    "AWS_CONTAINER_CREDENTIALS_FULL_URI",
    "AWS_CONTAINER_AUTHORIZATION_TOKEN",
    "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE",
    "AWS_EC2_METADATA_SERVICE_ENDPOINT",
    "RUST_LOG",
];

/// Isolated working area for one invocation of the binary.
pub struct Workspace {
    pub dir: TempDir,
}

/// Captured result of one run.
#[derive(Debug)]
pub struct RunResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for RunResult {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the workspace.
    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Run graphlink with a scrubbed environment rooted in the workspace.
    pub fn run(&self, args: &[&str]) -> RunResult {
        self.run_with(args, &[])
    }

    /// Like [`Workspace::run`], with extra variables set last.
    pub fn run_with(&self, args: &[&str], vars: &[(&str, &str)]) -> RunResult {
        let mut command = Command::new(env!("CARGO_BIN_EXE_graphlink"));
        for name in AWS_ENV {
            command.env_remove(name);
        }
        command
            .env("HOME", self.path())
            .env(
                "AWS_SHARED_CREDENTIALS_FILE",
                self.path().join("missing-credentials"),
            )
            .env("AWS_CONFIG_FILE", self.path().join("missing-config"))
            .env("AWS_EC2_METADATA_DISABLED", "true")
            .envs(vars.iter().copied())
            .current_dir(self.path())
            .args(args)
            .output()
            .expect("run graphlink")
            .into()
    }
}

/// Common session flags for the graph-changing subcommands.
pub fn session_args<'a>(subcommand: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec![
        subcommand,
        "--admin-account",
        "555555555555",
        "--assume-role",
        "graphAdmin",
        "--regions",
        "us-east-1",
    ];
    args.extend_from_slice(extra);
    args
}
