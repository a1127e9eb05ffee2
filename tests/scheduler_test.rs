use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use app_bootstrap::error::BoxError;
use app_bootstrap::scheduler::{cancellable, job, run_all, Interrupted, Job};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("job {0} failed")]
struct JobFailed(usize);

/// A job that waits for cancellation, then counts itself as exited.
fn waiter(exited: &Arc<AtomicUsize>) -> Job {
    let exited = Arc::clone(exited);
    job(move |ctx: CancellationToken| async move {
        let result = cancellable(&ctx, std::future::pending::<()>()).await;
        exited.fetch_add(1, Ordering::SeqCst);
        result.map_err(BoxError::from)
    })
}

#[tokio::test]
async fn test_one_failure_stops_every_job() {
    let exited = Arc::new(AtomicUsize::new(0));
    let mut jobs: Vec<Job> = (0..4).map(|_| waiter(&exited)).collect();
    let failed = Arc::clone(&exited);
    jobs.insert(
        2,
        job(move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            failed.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(JobFailed(2))
        }),
    );

    let ctx = CancellationToken::new();
    let errors = run_all(&ctx, jobs).await.unwrap_err();

    assert_eq!(exited.load(Ordering::SeqCst), 5);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.to_string(), "job 2 failed");
    assert!(!ctx.is_cancelled());
}

#[tokio::test]
async fn test_every_real_failure_is_collected() {
    let jobs: Vec<Job> = (0..3)
        .map(|i| job(move |_ctx| async move { Err::<(), _>(JobFailed(i)) }))
        .collect();

    let errors = run_all(&CancellationToken::new(), jobs).await.unwrap_err();

    let mut messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    messages.sort();
    assert_eq!(messages, ["job 0 failed", "job 1 failed", "job 2 failed"]);
}

#[tokio::test]
async fn test_caller_cancellation_ends_cleanly() {
    let exited = Arc::new(AtomicUsize::new(0));
    let jobs: Vec<Job> = (0..3).map(|_| waiter(&exited)).collect();
    let ctx = CancellationToken::new();

    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    run_all(&ctx, jobs).await.expect("interrupted jobs are not failures");
    assert_eq!(exited.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_wrapped_interruption_is_filtered() {
    #[derive(Debug, thiserror::Error)]
    #[error("serving: {0}")]
    struct Serve(#[source] Interrupted);

    let jobs = vec![job(|_ctx| async { Err::<(), _>(Serve(Interrupted::DeadlineExceeded)) })];
    run_all(&CancellationToken::new(), jobs).await.unwrap();
}

#[tokio::test]
async fn test_no_jobs() {
    run_all(&CancellationToken::new(), Vec::new()).await.unwrap();
}
