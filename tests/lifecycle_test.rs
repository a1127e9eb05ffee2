use std::sync::atomic::{AtomicBool, Ordering};

use app_bootstrap::decode::{decode_as, DecodeOptions, Environment};
use app_bootstrap::lifecycle::mock::{Journal, MockParam};
use app_bootstrap::lifecycle::{ConfigureData, LifecycleError, Orchestrator, Phase, ResourceState};
use app_bootstrap::record;
use app_bootstrap::registry::ParserRegistry;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Backends {
    cache: MockParam,
    queue: Option<MockParam>,
}

record! {
    Backends {
        cache;
        queue;
    }
}

#[derive(Debug, Default)]
struct Config {
    database: MockParam,
    backends: Backends,
    audit: Option<Box<MockParam>>,
    ignored: MockParam,
    workers: u32,
}

record! {
    Config {
        database: key = "DB";
        backends: prefix = "BACKEND_";
        audit;
        ignored: skip;
        workers: default = "4";
    }
}

fn config(journal: &Journal, failing_acquire: Option<&str>) -> Config {
    let mock = |name: &str| {
        let param = MockParam::new(name).with_journal(journal.clone());
        if failing_acquire == Some(name) {
            param.fail_on(Phase::Acquire)
        } else {
            param
        }
    };
    Config {
        database: mock("database"),
        backends: Backends {
            cache: mock("cache"),
            queue: Some(mock("queue")),
        },
        audit: Some(Box::new(mock("audit"))),
        ignored: mock("ignored"),
        workers: 4,
    }
}

/// Discovery walks nested records and pointer layers in declaration order.
#[test]
fn test_discovery_order_and_keys() {
    let journal = Journal::new();
    let config = config(&journal, None);
    let orchestrator = Orchestrator::discover(&config);

    assert_eq!(
        orchestrator.keys().collect::<Vec<_>>(),
        vec!["DB", "BACKEND_CACHE", "BACKEND_QUEUE", "AUDIT"]
    );
    assert!(orchestrator
        .states()
        .iter()
        .all(|(_, state)| *state == ResourceState::Unconfigured));
}

#[test]
fn test_absent_optional_resources_are_skipped() {
    let journal = Journal::new();
    let mut config = config(&journal, None);
    config.backends.queue = None;
    config.audit = None;

    let orchestrator = Orchestrator::discover(&config);
    assert_eq!(orchestrator.keys().collect::<Vec<_>>(), vec!["DB", "BACKEND_CACHE"]);
}

#[tokio::test]
async fn test_full_lifecycle_through_discovery() {
    let journal = Journal::new();
    let config = config(&journal, None);
    let ctx = CancellationToken::new();

    let output = Orchestrator::discover(&config)
        .run(&ctx, ConfigureData::new(), || async { 42 })
        .await
        .expect("lifecycle succeeds");

    assert_eq!(output, 42);
    let order = ["database", "cache", "queue", "audit"];
    assert_eq!(journal.names(Phase::Configure), order);
    assert_eq!(journal.names(Phase::Acquire), order);
    assert_eq!(
        journal.names(Phase::Shutdown),
        order.iter().rev().copied().collect::<Vec<_>>()
    );
    config.ignored.verify(&[]);
}

#[tokio::test]
async fn test_acquire_failure_rolls_back_in_reverse() {
    let journal = Journal::new();
    let config = config(&journal, Some("queue"));
    let ctx = CancellationToken::new();
    let ran = AtomicBool::new(false);
    let flag = &ran;

    let err = Orchestrator::discover(&config)
        .run(&ctx, ConfigureData::new(), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

    assert!(!ran.load(Ordering::SeqCst));
    let LifecycleError::Acquire { failed, rollback } = &err else {
        panic!("expected an acquire error, got {err:?}");
    };
    assert_eq!(failed.key, "BACKEND_QUEUE");
    assert!(rollback.is_empty());

    assert_eq!(journal.names(Phase::Acquire), ["database", "cache", "queue"]);
    assert_eq!(journal.names(Phase::Shutdown), ["cache", "database"]);
    config.backends.queue.as_ref().unwrap().verify(&[Phase::Configure, Phase::Acquire]);
    config.audit.as_ref().unwrap().verify(&[Phase::Configure]);
}

#[tokio::test]
async fn test_resources_decoded_from_environment() {
    let env = Environment::from([
        ("DB", "primary"),
        ("BACKEND_CACHE", "redis"),
        ("BACKEND_QUEUE", "amqp!configure"),
        ("AUDIT", "audit-log"),
    ]);
    let config: Config = decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();
    assert_eq!(config.backends.queue.as_ref().map(MockParam::name), Some("amqp"));

    let err = Orchestrator::discover(&config)
        .run(&CancellationToken::new(), ConfigureData::new(), || async {})
        .await
        .unwrap_err();

    let failed: Vec<&str> = err.phase_errors().iter().map(|e| e.key.as_str()).collect();
    assert_eq!(failed, ["BACKEND_QUEUE"]);
    config.database.verify(&[Phase::Configure]);
}

#[test]
fn test_discovery_keys_carry_the_decode_prefix() {
    let env = Environment::from([
        ("APP_DB", "primary"),
        ("APP_BACKEND_CACHE", "redis"),
        ("APP_BACKEND_QUEUE", "amqp"),
        ("APP_AUDIT", "audit-log"),
    ]);
    let options = DecodeOptions::new().prefix("APP_");
    let config: Config = decode_as(&ParserRegistry::new(), &env, options).unwrap();

    let orchestrator = Orchestrator::discover_with_prefix(&config, "APP_");
    let keys: Vec<&str> = orchestrator.keys().collect();
    assert_eq!(keys, ["APP_DB", "APP_BACKEND_CACHE", "APP_BACKEND_QUEUE", "APP_AUDIT"]);
    assert!(keys.iter().all(|key| env.get(key).is_some()));
}
