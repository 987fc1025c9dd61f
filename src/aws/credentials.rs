//! Base credential discovery.
//!
//! Sources are tried in this order:
//!
//! 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (+ `AWS_SESSION_TOKEN`)
//! 2. a web identity token (`AWS_WEB_IDENTITY_TOKEN_FILE` + `AWS_ROLE_ARN`)
//! 3. the profile named by `AWS_PROFILE` (else `default`), merged from the
//!    shared credentials file and the config file
//! 4. the container credentials endpoint
//! 5. instance metadata (IMDSv2)
//!
//! A profile named through `AWS_PROFILE` must exist; a missing `default`
//! profile falls through to the container and instance sources.
//!
//! Profiles may hold static keys, a `credential_process`, a web identity
//! token file, or a `role_arn` assumed from a `source_profile` or a
//! `credential_source`. Network and process work goes through
//! [`CredentialFetch`] so resolution itself stays testable.
use crate::provider::ProviderError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Variable lookup, normally `std::env::var`.
pub type Env<'a> = &'a dyn Fn(&str) -> Option<String>;

const DEFAULT_PROFILE: &str = "default";
const CONTAINER_ENDPOINT: &str = "http://169.254.170.2";
const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

/// Signing credentials, either long-lived or from an assumed role.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Role to assume on top of other credentials or a web identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequest<'a> {
    pub role_arn: &'a str,
    pub session_name: &'a str,
    pub external_id: Option<&'a str>,
}

/// Container credentials URL and its optional authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEndpoint {
    pub url: String,
    pub authorization: Option<String>,
}

/// Sources that need the network or a child process.
pub trait CredentialFetch {
    fn assume_role(
        &self,
        base: &Credentials,
        role: &RoleRequest<'_>,
    ) -> Result<Credentials, ProviderError>;
    fn web_identity(&self, role: &RoleRequest<'_>, token: &str)
        -> Result<Credentials, ProviderError>;
    fn container(&self, endpoint: &ContainerEndpoint) -> Result<Credentials, ProviderError>;
    fn instance(&self, endpoint: &str) -> Result<Credentials, ProviderError>;
    fn process(&self, command: &str) -> Result<Credentials, ProviderError>;
}

/// Where one profile gets its credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    Static(Credentials),
    Process(String),
    WebIdentity {
        role_arn: String,
        token_file: PathBuf,
        session_name: Option<String>,
    },
    Environment,
    Container,
    InstanceMetadata,
    AssumeRole {
        role_arn: String,
        session_name: Option<String>,
        external_id: Option<String>,
        source: Box<ProfileSource>,
    },
}

fn credentials_error(detail: impl Into<String>) -> ProviderError {
    ProviderError::Credentials(detail.into())
}

fn non_empty(env: Env<'_>, name: &str) -> Option<String> {
    env(name).filter(|value| !value.trim().is_empty())
}

/// Resolve base credentials from the process environment.
pub fn discover(fetch: &dyn CredentialFetch) -> Result<Credentials, ProviderError> {
    discover_with(&|name| std::env::var(name).ok(), fetch)
}

pub(crate) fn discover_with(
    env: Env<'_>,
    fetch: &dyn CredentialFetch,
) -> Result<Credentials, ProviderError> {
    if let Some(credentials) = environment_keys(env) {
        tracing::debug!("using credentials from environment");
        return Ok(credentials);
    }

    if let Some(token_file) = non_empty(env, "AWS_WEB_IDENTITY_TOKEN_FILE") {
        let role_arn = non_empty(env, "AWS_ROLE_ARN").ok_or_else(|| {
            credentials_error("AWS_WEB_IDENTITY_TOKEN_FILE is set without AWS_ROLE_ARN")
        })?;
        let session_name = non_empty(env, "AWS_ROLE_SESSION_NAME");
        tracing::debug!(role_arn = role_arn.as_str(), "using web identity token");
        return web_identity(
            fetch,
            &role_arn,
            session_name.as_deref(),
            Path::new(&token_file),
        );
    }

    let explicit = non_empty(env, "AWS_PROFILE");
    let name = explicit.as_deref().unwrap_or(DEFAULT_PROFILE);
    let profiles = ProfileSet::load(env)?;
    match profiles.source(name)? {
        Some(source) => {
            tracing::debug!(profile = name, files = %profiles.describe(), "using shared profile");
            return resolve(&source, env, fetch);
        }
        None if explicit.is_some() => {
            return Err(credentials_error(format!(
                "profile {name} not found in {}",
                profiles.describe()
            )));
        }
        None => {}
    }

    if let Some(endpoint) = container_endpoint(env)? {
        tracing::debug!(url = endpoint.url.as_str(), "using container credentials");
        return fetch.container(&endpoint);
    }
    if metadata_disabled(env) {
        return Err(credentials_error(format!(
            "no credentials in environment or {}, and instance metadata is disabled",
            profiles.describe()
        )));
    }
    fetch.instance(&metadata_endpoint(env)).map_err(|err| {
        credentials_error(format!(
            "no credentials in environment or {}, and instance metadata failed: {err}",
            profiles.describe()
        ))
    })
}

fn environment_keys(env: Env<'_>) -> Option<Credentials> {
    Some(Credentials {
        access_key_id: non_empty(env, "AWS_ACCESS_KEY_ID")?,
        secret_access_key: non_empty(env, "AWS_SECRET_ACCESS_KEY")?,
        session_token: non_empty(env, "AWS_SESSION_TOKEN"),
    })
}

fn resolve(
    source: &ProfileSource,
    env: Env<'_>,
    fetch: &dyn CredentialFetch,
) -> Result<Credentials, ProviderError> {
    match source {
        ProfileSource::Static(credentials) => Ok(credentials.clone()),
        ProfileSource::Process(command) => fetch.process(command),
        ProfileSource::WebIdentity {
            role_arn,
            token_file,
            session_name,
        } => web_identity(fetch, role_arn, session_name.as_deref(), token_file),
        ProfileSource::Environment => environment_keys(env).ok_or_else(|| {
            credentials_error("credential_source Environment found no keys in the environment")
        }),
        ProfileSource::Container => {
            let endpoint = container_endpoint(env)?.ok_or_else(|| {
                credentials_error(
                    "credential_source EcsContainer needs AWS_CONTAINER_CREDENTIALS_RELATIVE_URI \
                     or AWS_CONTAINER_CREDENTIALS_FULL_URI",
                )
            })?;
            fetch.container(&endpoint)
        }
        ProfileSource::InstanceMetadata => fetch.instance(&metadata_endpoint(env)),
        ProfileSource::AssumeRole {
            role_arn,
            session_name,
            external_id,
            source,
        } => {
            let base = resolve(source, env, fetch)?;
            let session_name = session_name.clone().unwrap_or_else(default_session_name);
            tracing::debug!(role_arn = role_arn.as_str(), "assuming profile role");
            fetch.assume_role(
                &base,
                &RoleRequest {
                    role_arn,
                    session_name: &session_name,
                    external_id: external_id.as_deref(),
                },
            )
        }
    }
}

fn web_identity(
    fetch: &dyn CredentialFetch,
    role_arn: &str,
    session_name: Option<&str>,
    token_file: &Path,
) -> Result<Credentials, ProviderError> {
    let token = std::fs::read_to_string(token_file).map_err(|err| {
        credentials_error(format!(
            "read web identity token {}: {err}",
            token_file.display()
        ))
    })?;
    let session_name = session_name
        .map(str::to_string)
        .unwrap_or_else(default_session_name);
    fetch.web_identity(
        &RoleRequest {
            role_arn,
            session_name: &session_name,
            external_id: None,
        },
        token.trim(),
    )
}

fn default_session_name() -> String {
    format!("graphlink-session-{}", chrono::Utc::now().timestamp())
}

fn container_endpoint(env: Env<'_>) -> Result<Option<ContainerEndpoint>, ProviderError> {
    let url = match (
        non_empty(env, "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"),
        non_empty(env, "AWS_CONTAINER_CREDENTIALS_FULL_URI"),
    ) {
        (Some(relative), _) => format!("{CONTAINER_ENDPOINT}{relative}"),
        (None, Some(full)) => full,
        (None, None) => return Ok(None),
    };
    let authorization = match non_empty(env, "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE") {
        Some(path) => Some(
            std::fs::read_to_string(&path)
                .map_err(|err| {
                    credentials_error(format!("read container authorization token {path}: {err}"))
                })?
                .trim()
                .to_string(),
        ),
        None => non_empty(env, "AWS_CONTAINER_AUTHORIZATION_TOKEN"),
    };
    Ok(Some(ContainerEndpoint { url, authorization }))
}

fn metadata_disabled(env: Env<'_>) -> bool {
    non_empty(env, "AWS_EC2_METADATA_DISABLED")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn metadata_endpoint(env: Env<'_>) -> String {
    non_empty(env, "AWS_EC2_METADATA_SERVICE_ENDPOINT")
        .map(|endpoint| endpoint.trim().trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string())
}

type Section = BTreeMap<String, String>;

/// Profiles merged from the shared credentials and config files.
#[derive(Debug, Default)]
pub struct ProfileSet {
    profiles: BTreeMap<String, Section>,
    files: Vec<PathBuf>,
}

impl ProfileSet {
    /// Read both files; a missing file contributes nothing.
    fn load(env: Env<'_>) -> Result<Self, ProviderError> {
        let home = dirs::home_dir().map(|home| home.join(".aws"));
        let path_for = |variable: &str, file: &str| {
            non_empty(env, variable)
                .map(PathBuf::from)
                .or_else(|| home.as_ref().map(|dir| dir.join(file)))
        };
        let credentials_path = path_for("AWS_SHARED_CREDENTIALS_FILE", "credentials");
        let config_path = path_for("AWS_CONFIG_FILE", "config");

        let mut set = ProfileSet::default();
        // Keys from the credentials file win over the config file.
        for (path, config_style) in [(config_path, true), (credentials_path, false)] {
            let Some(path) = path else { continue };
            match std::fs::read_to_string(&path) {
                Ok(text) => set.merge(&text, config_style),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(credentials_error(format!("read {}: {err}", path.display())));
                }
            }
            set.files.push(path);
        }
        Ok(set)
    }

    #[cfg(test)]
    pub(crate) fn parse(credentials: &str, config: &str) -> Self {
        let mut set = ProfileSet::default();
        set.merge(config, true);
        set.merge(credentials, false);
        set
    }

    fn merge(&mut self, text: &str, config_style: bool) {
        for (name, section) in parse_sections(text, config_style) {
            self.profiles.entry(name).or_default().extend(section);
        }
    }

    fn describe(&self) -> String {
        if self.files.is_empty() {
            return "no shared config files".to_string();
        }
        self.files
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Plan for profile `name`, or `None` when no such profile exists.
    pub(crate) fn source(&self, name: &str) -> Result<Option<ProfileSource>, ProviderError> {
        if !self.profiles.contains_key(name) {
            return Ok(None);
        }
        self.source_at(name, &mut Vec::new()).map(Some)
    }

    fn source_at(&self, name: &str, visited: &mut Vec<String>) -> Result<ProfileSource, ProviderError> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| credentials_error(format!("source profile {name} not found")))?;
        if visited.iter().any(|seen| seen == name) {
            visited.push(name.to_string());
            return Err(credentials_error(format!(
                "source_profile cycle: {}",
                visited.join(" -> ")
            )));
        }
        visited.push(name.to_string());
        let get = |key: &str| {
            profile
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
        };

        if let Some(role_arn) = get("role_arn") {
            if get("mfa_serial").is_some() {
                return Err(credentials_error(format!(
                    "profile {name} requires an MFA code, which graphlink cannot prompt for"
                )));
            }
            let source = match (get("source_profile"), get("credential_source")) {
                (Some(_), Some(_)) => {
                    return Err(credentials_error(format!(
                        "profile {name} sets both source_profile and credential_source"
                    )));
                }
                (Some(source), None) if source == name => static_keys(profile)
                    .map(ProfileSource::Static)
                    .ok_or_else(|| {
                        credentials_error(format!("profile {name} sources itself without keys"))
                    })?,
                (Some(source), None) => self.source_at(&source, visited)?,
                (None, Some(kind)) => named_source(name, &kind)?,
                (None, None) => {
                    return match get("web_identity_token_file") {
                        Some(token_file) => Ok(ProfileSource::WebIdentity {
                            role_arn,
                            token_file: PathBuf::from(token_file),
                            session_name: get("role_session_name"),
                        }),
                        None => Err(credentials_error(format!(
                            "profile {name} sets role_arn without source_profile or credential_source"
                        ))),
                    };
                }
            };
            return Ok(ProfileSource::AssumeRole {
                role_arn,
                session_name: get("role_session_name"),
                external_id: get("external_id"),
                source: Box::new(source),
            });
        }
        if let Some(credentials) = static_keys(profile) {
            return Ok(ProfileSource::Static(credentials));
        }
        if let Some(command) = get("credential_process") {
            return Ok(ProfileSource::Process(command));
        }
        if get("sso_session").is_some() || get("sso_start_url").is_some() {
            return Err(credentials_error(format!(
                "profile {name} uses IAM Identity Center; add \
                 `credential_process = aws configure export-credentials --profile {name} --format process` \
                 to a profile and select that one"
            )));
        }
        Err(credentials_error(format!("profile {name} has no usable credentials")))
    }
}

fn named_source(profile: &str, kind: &str) -> Result<ProfileSource, ProviderError> {
    match kind {
        "Environment" => Ok(ProfileSource::Environment),
        "EcsContainer" => Ok(ProfileSource::Container),
        "Ec2InstanceMetadata" => Ok(ProfileSource::InstanceMetadata),
        other => Err(credentials_error(format!(
            "profile {profile} has unsupported credential_source {other}"
        ))),
    }
}

fn static_keys(profile: &Section) -> Option<Credentials> {
    let get = |key: &str| profile.get(key).filter(|value| !value.is_empty()).cloned();
    Some(Credentials {
        access_key_id: get("aws_access_key_id")?,
        secret_access_key: get("aws_secret_access_key")?,
        session_token: get("aws_session_token"),
    })
}

/// Split an INI-style file into profile sections.
///
/// In the config file, profiles are `[default]` or `[profile name]`, and other
/// section kinds (`sso-session`, `services`) are skipped. Indented lines
/// belong to a nested block and are ignored.
fn parse_sections(text: &str, config_style: bool) -> Vec<(String, Section)> {
    let mut sections: Vec<(String, Section)> = Vec::new();
    let mut current: Option<usize> = None;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            current = profile_name(header.trim(), config_style).map(|name| {
                sections.push((name, Section::new()));
                sections.len() - 1
            });
            continue;
        }
        if raw.starts_with([' ', '\t']) {
            continue;
        }
        let (Some(index), Some((key, value))) = (current, line.split_once('=')) else {
            continue;
        };
        sections[index]
            .1
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    sections
}

fn profile_name(header: &str, config_style: bool) -> Option<String> {
    if !config_style {
        return Some(header.to_string());
    }
    if header == DEFAULT_PROFILE {
        return Some(header.to_string());
    }
    header
        .strip_prefix("profile")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(|rest| rest.trim().to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessOutput {
    version: u32,
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

/// Decode the JSON a `credential_process` prints.
pub(crate) fn parse_process_output(output: &str) -> Result<Credentials, ProviderError> {
    let parsed: ProcessOutput = serde_json::from_str(output)
        .map_err(|err| credentials_error(format!("credential_process output: {err}")))?;
    if parsed.version != 1 {
        return Err(credentials_error(format!(
            "credential_process output has unsupported Version {}",
            parsed.version
        )));
    }
    Ok(Credentials {
        access_key_id: parsed.access_key_id,
        secret_access_key: parsed.secret_access_key,
        session_token: parsed.session_token.filter(|token| !token.is_empty()),
    })
}

/// Run a `credential_process` command line through the platform shell.
pub(crate) fn run_process(command: &str) -> Result<Credentials, ProviderError> {
    let mut shell = if cfg!(windows) {
        let mut shell = std::process::Command::new("cmd");
        shell.arg("/C");
        shell
    } else {
        let mut shell = std::process::Command::new("sh");
        shell.arg("-c");
        shell
    };
    let output = shell
        .arg(command)
        .stdin(std::process::Stdio::null())
        .output()
        .map_err(|err| credentials_error(format!("run credential_process: {err}")))?;
    if !output.status.success() {
        return Err(credentials_error(format!(
            "credential_process exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_process_output(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
