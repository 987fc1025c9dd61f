use super::*;
use std::cell::RefCell;
use tempfile::TempDir;

fn issued(label: &str) -> Credentials {
    Credentials {
        access_key_id: format!("ASIA{label}"),
        secret_access_key: format!("secret-{label}"),
        session_token: Some(format!("token-{label}")),
    }
}

/// Records each network or process fetch and hands back labelled keys.
#[derive(Default)]
struct RecordingFetch {
    calls: RefCell<Vec<String>>,
}

impl RecordingFetch {
    fn record(&self, call: String, label: &str) -> Result<Credentials, ProviderError> {
        self.calls.borrow_mut().push(call);
        Ok(issued(label))
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CredentialFetch for RecordingFetch {
    fn assume_role(
        &self,
        base: &Credentials,
        role: &RoleRequest<'_>,
    ) -> Result<Credentials, ProviderError> {
        self.record(
            format!(
                "assume {} as {} from {} external {:?}",
                role.role_arn, role.session_name, base.access_key_id, role.external_id
            ),
            "ROLE",
        )
    }

    fn web_identity(
        &self,
        role: &RoleRequest<'_>,
        token: &str,
    ) -> Result<Credentials, ProviderError> {
        self.record(format!("web {} token {token}", role.role_arn), "WEB")
    }

    fn container(&self, endpoint: &ContainerEndpoint) -> Result<Credentials, ProviderError> {
        self.record(
            format!("container {} auth {:?}", endpoint.url, endpoint.authorization),
            "CONTAINER",
        )
    }

    fn instance(&self, endpoint: &str) -> Result<Credentials, ProviderError> {
        self.record(format!("instance {endpoint}"), "INSTANCE")
    }

    fn process(&self, command: &str) -> Result<Credentials, ProviderError> {
        self.record(format!("process {command}"), "PROCESS")
    }
}

/// Shared files live in a temp dir; both paths are always set so the real
/// home directory is never read.
struct Fixture {
    dir: TempDir,
    vars: BTreeMap<String, String>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut vars = BTreeMap::new();
        for (name, file) in [
            ("AWS_SHARED_CREDENTIALS_FILE", "credentials"),
            ("AWS_CONFIG_FILE", "config"),
        ] {
            vars.insert(name.to_string(), dir.path().join(file).display().to_string());
        }
        Self { dir, vars }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    fn set(&mut self, name: &str, value: &str) -> &mut Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    fn discover(&self, fetch: &RecordingFetch) -> Result<Credentials, ProviderError> {
        discover_with(&|name| self.vars.get(name).cloned(), fetch)
    }
}

fn detail(result: Result<Credentials, ProviderError>) -> String {
    match result {
        Err(ProviderError::Credentials(detail)) => detail,
        other => panic!("expected a credentials error, got {other:?}"),
    }
}

const CREDENTIALS: &str = "\
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = secret-default

# audit account
[audit]
aws_access_key_id=AKIDAUDIT
aws_secret_access_key=secret-audit
aws_session_token=token-audit
";

#[test]
fn environment_keys_take_precedence() {
    let mut fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    fixture
        .set("AWS_ACCESS_KEY_ID", "AKIDENV")
        .set("AWS_SECRET_ACCESS_KEY", "secret-env");
    let fetch = RecordingFetch::default();

    let credentials = fixture.discover(&fetch).expect("env");

    assert_eq!(credentials.access_key_id, "AKIDENV");
    assert!(credentials.session_token.is_none());
    assert!(fetch.calls().is_empty());
}

#[test]
fn credentials_file_profile_is_selected_by_name() {
    let mut fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    fixture.set("AWS_PROFILE", "audit");

    let credentials = fixture.discover(&RecordingFetch::default()).expect("audit");

    assert_eq!(credentials.access_key_id, "AKIDAUDIT");
    assert_eq!(credentials.session_token.as_deref(), Some("token-audit"));
}

#[test]
fn keys_in_the_config_file_alone_are_found() {
    let fixture = Fixture::new();
    fixture.write(
        "config",
        "[default]\nregion = us-east-1\naws_access_key_id = AKIDCONFIG\naws_secret_access_key = secret-config\n",
    );
    let fetch = RecordingFetch::default();

    let credentials = fixture.discover(&fetch).expect("config keys");

    assert_eq!(credentials.access_key_id, "AKIDCONFIG");
    assert!(fetch.calls().is_empty());
}

#[test]
fn config_profiles_need_the_profile_prefix() {
    let config = "\
[profile audit]
aws_access_key_id = AKIDPREFIXED
aws_secret_access_key = secret

[ops]
aws_access_key_id = AKIDBARE
aws_secret_access_key = secret

[sso-session corp]
sso_start_url = https://example.awsapps.com/start
";
    let profiles = ProfileSet::parse("", config);

    assert!(matches!(
        profiles.source("audit"),
        Ok(Some(ProfileSource::Static(Credentials { ref access_key_id, .. }))) if access_key_id == "AKIDPREFIXED"
    ));
    assert_eq!(profiles.source("ops").expect("lookup"), None);
    assert_eq!(profiles.source("corp").expect("lookup"), None);
}

#[test]
fn credentials_file_wins_over_config_file() {
    let fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    fixture.write(
        "config",
        "[default]\naws_access_key_id = AKIDCONFIG\naws_secret_access_key = secret-config\n",
    );

    let credentials = fixture.discover(&RecordingFetch::default()).expect("keys");

    assert_eq!(credentials.access_key_id, "AKIDDEFAULT");
    assert_eq!(credentials.secret_access_key, "secret-default");
}

#[test]
fn nested_config_blocks_are_skipped() {
    let config = "\
[default]
s3 =
  max_concurrent_requests = 20
  aws_access_key_id = AKIDNESTED
aws_access_key_id = AKIDTOP
aws_secret_access_key = secret
";
    let Some(ProfileSource::Static(credentials)) =
        ProfileSet::parse("", config).source("default").expect("lookup")
    else {
        panic!("expected static keys");
    };
    assert_eq!(credentials.access_key_id, "AKIDTOP");
}

#[test]
fn role_profile_assumes_from_its_source_profile() {
    let mut fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    fixture.write(
        "config",
        "\
[profile admin]
role_arn = arn:aws:iam::555555555555:role/graphAdmin
source_profile = audit
role_session_name = ops-session
external_id = ext-1
",
    );
    fixture.set("AWS_PROFILE", "admin");
    let fetch = RecordingFetch::default();

    let credentials = fixture.discover(&fetch).expect("role");

    assert_eq!(credentials, issued("ROLE"));
    assert_eq!(
        fetch.calls(),
        vec![
            "assume arn:aws:iam::555555555555:role/graphAdmin as ops-session from AKIDAUDIT \
             external Some(\"ext-1\")"
                .to_string()
        ]
    );
}

#[test]
fn role_chains_resolve_innermost_first() {
    let config = "\
[profile first]
role_arn = arn:aws:iam::111111111111:role/first
credential_source = Ec2InstanceMetadata

[profile second]
role_arn = arn:aws:iam::222222222222:role/second
source_profile = first
";
    let profiles = ProfileSet::parse("", config);
    let source = profiles.source("second").expect("plan").expect("profile");
    let fetch = RecordingFetch::default();

    let credentials = resolve(&source, &|_| None, &fetch).expect("chain");

    assert_eq!(credentials, issued("ROLE"));
    let calls = fetch.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "instance http://169.254.169.254");
    assert!(calls[1].starts_with("assume arn:aws:iam::111111111111:role/first as graphlink-session-"));
    assert!(calls[1].contains("from ASIAINSTANCE"));
    assert!(calls[2].starts_with("assume arn:aws:iam::222222222222:role/second"));
    assert!(calls[2].contains("from ASIAROLE"));
}

#[test]
fn source_profile_cycles_are_rejected() {
    let config = "\
[profile a]
role_arn = arn:aws:iam::111111111111:role/a
source_profile = b

[profile b]
role_arn = arn:aws:iam::111111111111:role/b
source_profile = a
";
    let err = ProfileSet::parse("", config)
        .source("a")
        .expect_err("cycle");
    assert!(err.to_string().contains("a -> b -> a"), "{err}");
}

#[test]
fn profile_may_source_its_own_keys() {
    let credentials = "\
[ops]
aws_access_key_id = AKIDOPS
aws_secret_access_key = secret
role_arn = arn:aws:iam::111111111111:role/ops
source_profile = ops
";
    let source = ProfileSet::parse(credentials, "")
        .source("ops")
        .expect("plan")
        .expect("profile");
    let ProfileSource::AssumeRole { source, .. } = source else {
        panic!("expected a role");
    };
    assert!(matches!(*source, ProfileSource::Static(_)));
}

#[test]
fn credential_process_profile_runs_the_command() {
    let mut fixture = Fixture::new();
    fixture.write(
        "config",
        "[profile sso]\ncredential_process = aws configure export-credentials --profile corp --format process\n",
    );
    fixture.set("AWS_PROFILE", "sso");
    let fetch = RecordingFetch::default();

    assert_eq!(fixture.discover(&fetch).expect("process"), issued("PROCESS"));
    assert_eq!(
        fetch.calls(),
        vec!["process aws configure export-credentials --profile corp --format process".to_string()]
    );
}

#[test]
fn identity_center_profile_points_at_credential_process() {
    let mut fixture = Fixture::new();
    fixture.write(
        "config",
        "[profile corp]\nsso_session = corp\nsso_account_id = 111111111111\nsso_role_name = Admin\n",
    );
    fixture.set("AWS_PROFILE", "corp");

    let detail = detail(fixture.discover(&RecordingFetch::default()));

    assert!(detail.contains("credential_process"), "{detail}");
}

#[test]
fn mfa_profiles_are_refused() {
    let config = "\
[profile guarded]
role_arn = arn:aws:iam::111111111111:role/guarded
source_profile = default
mfa_serial = arn:aws:iam::111111111111:mfa/ops
";
    let err = ProfileSet::parse(CREDENTIALS, config)
        .source("guarded")
        .expect_err("mfa");
    assert!(err.to_string().contains("MFA"), "{err}");
}

#[test]
fn named_profile_must_exist() {
    let mut fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    fixture.set("AWS_PROFILE", "prod");
    let fetch = RecordingFetch::default();

    let detail = detail(fixture.discover(&fetch));

    assert!(detail.starts_with("profile prod not found in "), "{detail}");
    assert!(fetch.calls().is_empty());
}

#[test]
fn web_identity_token_is_exchanged_for_credentials() {
    let mut fixture = Fixture::new();
    fixture.write("credentials", CREDENTIALS);
    let token = fixture.write("token", "header.payload.signature\n");
    fixture
        .set("AWS_WEB_IDENTITY_TOKEN_FILE", &token.display().to_string())
        .set("AWS_ROLE_ARN", "arn:aws:iam::111111111111:role/pod");
    let fetch = RecordingFetch::default();

    assert_eq!(fixture.discover(&fetch).expect("web identity"), issued("WEB"));
    assert_eq!(
        fetch.calls(),
        vec!["web arn:aws:iam::111111111111:role/pod token header.payload.signature".to_string()]
    );
}

#[test]
fn web_identity_needs_a_role() {
    let mut fixture = Fixture::new();
    fixture.set("AWS_WEB_IDENTITY_TOKEN_FILE", "/var/run/token");

    let detail = detail(fixture.discover(&RecordingFetch::default()));

    assert!(detail.contains("AWS_ROLE_ARN"), "{detail}");
}

#[test]
fn container_endpoint_comes_before_instance_metadata() {
    let mut fixture = Fixture::new();
    fixture.set("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/credentials/abc");
    let fetch = RecordingFetch::default();

    assert_eq!(fixture.discover(&fetch).expect("container"), issued("CONTAINER"));
    assert_eq!(
        fetch.calls(),
        vec!["container http://169.254.170.2/v2/credentials/abc auth None".to_string()]
    );
}

#[test]
fn full_container_uri_reads_its_token_file() {
    let mut fixture = Fixture::new();
    let token = fixture.write("container-token", "opaque-token\n");
    fixture
        .set("AWS_CONTAINER_CREDENTIALS_FULL_URI", "http://127.0.0.1:8080/creds")
        .set(
            "AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE",
            &token.display().to_string(),
        )
        .set("AWS_CONTAINER_AUTHORIZATION_TOKEN", "ignored");
    let fetch = RecordingFetch::default();

    fixture.discover(&fetch).expect("container");

    assert_eq!(
        fetch.calls(),
        vec!["container http://127.0.0.1:8080/creds auth Some(\"opaque-token\")".to_string()]
    );
}

#[test]
fn instance_metadata_is_the_last_resort() {
    let mut fixture = Fixture::new();
    let fetch = RecordingFetch::default();
    assert_eq!(fixture.discover(&fetch).expect("instance"), issued("INSTANCE"));

    fixture.set("AWS_EC2_METADATA_SERVICE_ENDPOINT", "http://[fd00:ec2::254]/");
    fixture.discover(&fetch).expect("instance");

    assert_eq!(
        fetch.calls(),
        vec![
            "instance http://169.254.169.254".to_string(),
            "instance http://[fd00:ec2::254]".to_string(),
        ]
    );
}

#[test]
fn disabled_instance_metadata_ends_the_search() {
    let mut fixture = Fixture::new();
    fixture.set("AWS_EC2_METADATA_DISABLED", "TRUE");
    let fetch = RecordingFetch::default();

    let detail = detail(fixture.discover(&fetch));

    assert!(detail.contains("instance metadata is disabled"), "{detail}");
    assert!(fetch.calls().is_empty());
}

#[test]
fn process_output_must_be_version_one() {
    let credentials = parse_process_output(
        r#"{"Version":1,"AccessKeyId":"ASIAPROC","SecretAccessKey":"s","SessionToken":"t","Expiration":"2030-01-01T00:00:00Z"}"#,
    )
    .expect("version 1");
    assert_eq!(credentials.access_key_id, "ASIAPROC");
    assert_eq!(credentials.session_token.as_deref(), Some("t"));

    let err = parse_process_output(r#"{"Version":2,"AccessKeyId":"a","SecretAccessKey":"s"}"#)
        .expect_err("version 2");
    assert!(err.to_string().contains("Version 2"), "{err}");
}

#[test]
fn debug_output_hides_secrets() {
    let rendered = format!("{:?}", issued("DEBUG"));
    assert!(rendered.contains("ASIADEBUG"));
    assert!(!rendered.contains("secret-DEBUG"));
    assert!(!rendered.contains("token-DEBUG"));
}
