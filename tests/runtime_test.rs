use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use app_bootstrap::decode::Environment;
use app_bootstrap::lifecycle::mock::MockParam;
use app_bootstrap::params::{Listener, SecretParam};
use app_bootstrap::record;
use app_bootstrap::registry::{Describe, TypeDescriptor};
use app_bootstrap::runtime::{run, ActionConfig, AppContext, ExitCode, RunOptions};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Default)]
struct Config {
    name: String,
    http: Option<Listener>,
    password: Option<SecretParam>,
    storages: BTreeMap<String, Url>,
    sentinel: Option<MockParam>,
}

record! {
    Config {
        name;
        http: key = "HTTP_ADDR", default = "tcp://127.0.0.1:0";
        password: key = "DB_PASSWORD", default = "";
        storages: key = "SECRET_STORAGES", separator = ";", kv_separator = "=", default = "";
        sentinel: default = "sentinel";
    }
}

impl ActionConfig for Config {
    fn secret_dsns(&self) -> BTreeMap<String, Option<Url>> {
        self.storages
            .iter()
            .map(|(scheme, dsn)| (scheme.clone(), Some(dsn.clone())))
            .collect()
    }
}

fn options(pairs: &[(&str, &str)]) -> RunOptions {
    let env: Environment = pairs.iter().copied().collect();
    RunOptions::new().environment(env).without_tracing()
}

/// Runs an action that only records that it ran.
async fn run_flagged(pairs: &[(&str, &str)]) -> (ExitCode, bool) {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let code = run(
        &CancellationToken::new(),
        options(pairs),
        move |_ctx, _app: AppContext<Config>| async move {
            flag.store(true, Ordering::SeqCst);
            ExitCode::SUCCESS
        },
    )
    .await;
    (code, ran.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_action_sees_acquired_resources() {
    let mut secrets = tempfile::NamedTempFile::new().unwrap();
    writeln!(secrets, "DB_PASSWORD=s3cret").unwrap();
    let dsn = Url::from_file_path(secrets.path()).unwrap();
    let storages = format!("app={dsn}");

    let code = run(
        &CancellationToken::new(),
        options(&[
            ("NAME", "billing"),
            ("DB_PASSWORD", "app:DB_PASSWORD"),
            ("SECRET_STORAGES", storages.as_str()),
        ]),
        |ctx, app: AppContext<Config>| async move {
            let config = app.config();
            let http = config.http.as_ref().expect("listener declared");
            let bound = http.local_addr().is_some() && http.take().is_some();

            let password = match &config.password {
                Some(password) => password.get(&ctx).await.unwrap_or_default(),
                None => Vec::new(),
            };
            if config.name == "billing" && bound && password == b"s3cret" {
                ExitCode::SUCCESS
            } else {
                ExitCode(9)
            }
        },
    )
    .await;

    assert_eq!(code, ExitCode::SUCCESS);
}

#[tokio::test]
async fn test_action_exit_code_is_returned() {
    let code = run(
        &CancellationToken::new(),
        options(&[("NAME", "svc")]),
        |_ctx, _app: AppContext<Config>| async { ExitCode(3) },
    )
    .await;
    assert_eq!(code, ExitCode(3));
}

#[tokio::test]
async fn test_missing_variable_fails_before_action() {
    let (code, ran) = run_flagged(&[]).await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(!ran);
}

#[tokio::test]
async fn test_invalid_variable_fails_before_action() {
    let (code, ran) = run_flagged(&[("NAME", "svc"), ("HTTP_ADDR", "udp://127.0.0.1:0")]).await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(!ran);
}

#[tokio::test]
async fn test_acquire_failure_fails_before_action() {
    let (code, ran) = run_flagged(&[("NAME", "svc"), ("SENTINEL", "sentinel!acquire")]).await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(!ran);
}

#[tokio::test]
async fn test_prefixed_resources_run_their_lifecycle() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let code = run(
        &CancellationToken::new(),
        options(&[("APP_NAME", "svc"), ("APP_SENTINEL", "sentinel!shutdown")]).prefix("APP_"),
        move |_ctx, _app: AppContext<Config>| async move {
            flag.store(true, Ordering::SeqCst);
            ExitCode::SUCCESS
        },
    )
    .await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unknown_secret_storage_fails_configure() {
    let (code, ran) = run_flagged(&[("NAME", "svc"), ("DB_PASSWORD", "vault:db")]).await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(!ran);
}

#[tokio::test]
async fn test_shutdown_failure_after_action() {
    let (code, ran) = run_flagged(&[("NAME", "svc"), ("SENTINEL", "sentinel!shutdown")]).await;
    assert_eq!(code, ExitCode::FAILURE);
    assert!(ran);
}

struct Opaque;

impl Describe for Opaque {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::named::<Self>()
    }
}

#[derive(Default)]
struct Undecodable {
    opaque: Option<Box<Opaque>>,
}

record! { Undecodable { opaque } }

impl ActionConfig for Undecodable {}

#[tokio::test]
async fn test_undecodable_configuration_type() {
    let code = run(
        &CancellationToken::new(),
        RunOptions::new().environment(Environment::new()).without_tracing(),
        |_ctx, _app: AppContext<Undecodable>| async { ExitCode::SUCCESS },
    )
    .await;
    assert_eq!(code, ExitCode::SCHEMA);
}
