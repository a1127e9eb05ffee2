//! # Fail-Fast Job Scheduler
//!
//! [`run_all`] starts a batch of independent jobs together and abandons them
//! together: the first job to fail for a real reason cancels the token every other
//! job is watching, and the call returns once *all* of them have exited.
//!
//! ```rust
//! use app_bootstrap::scheduler::{job, run_all, Interrupted};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = CancellationToken::new();
//!     let result = run_all(&ctx, [
//!         // Serves until told to stop
//!         job(|ctx: CancellationToken| async move {
//!             ctx.cancelled().await;
//!             Err::<(), _>(Interrupted::Cancelled)
//!         }),
//!         // Fails, which stops the job above
//!         job(|_| async { Err::<(), _>(std::io::Error::other("disk full")) }),
//!     ])
//!     .await;
//!
//!     let errors = result.unwrap_err();
//!     assert_eq!(errors.len(), 1);
//!     assert_eq!(errors.to_string(), "disk full");
//! }
//! ```
//!
//! ## Cancellation-class errors
//!
//! A job that exits *because* it was told to stop is not a failure. Errors whose
//! source chain contains an [`Interrupted`] or a [`tokio::time::error::Elapsed`] are
//! dropped from the result and do not trigger cancellation.
//!
//! Jobs cannot tell whether their token was cancelled by the caller or by a failing
//! sibling. Either way they are expected to stop promptly.

use std::any::Any;
use std::error::Error;
use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, MultiError};

/// A boxed unit of work started by [`run_all`].
pub type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Boxes a closure into a [`Job`].
pub fn job<F, Fut, E>(f: F) -> Job
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Box::new(move |ctx| {
        Box::pin(async move { f(ctx).await.map_err(Into::<BoxError>::into) })
    })
}

/// The error a job returns when it stopped on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Error)]
#[error("job panicked: {0}")]
pub struct JobPanicked(pub String);

/// Whether `err`, or anything in its source chain, is a cancellation signal.
pub fn is_interrupted(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<Interrupted>() || err.is::<Elapsed>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Runs `fut` until it completes or `ctx` is cancelled.
pub async fn cancellable<F: Future>(
    ctx: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        output = fut => Ok(output),
        () = ctx.cancelled() => Err(Interrupted::Cancelled),
    }
}

/// Runs every job concurrently against a child of `ctx`.
///
/// The child token is cancelled on the first failure that is not a cancellation
/// signal. Returns after every job has returned, with all real failures collected
/// in completion order. A panicking job counts as a failure.
pub async fn run_all<I>(ctx: &CancellationToken, jobs: I) -> Result<(), MultiError>
where
    I: IntoIterator<Item = Job>,
{
    let token = ctx.child_token();
    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        let future = job(token.clone());
        set.spawn(async move { (index, future.await) });
    }
    debug!(jobs = set.len(), "Jobs started");

    let mut errors = MultiError::new();
    while let Some(joined) = set.join_next().await {
        let failure: BoxError = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((index, Err(err))) if is_interrupted(&*err) => {
                trace!(index, "Job interrupted");
                continue;
            }
            Ok((index, Err(err))) => {
                warn!(index, error = %err, "Job failed");
                err
            }
            Err(err) if err.is_cancelled() => continue,
            Err(err) => {
                let message = panic_message(err.into_panic());
                warn!(panic = %message, "Job panicked");
                Box::new(JobPanicked(message))
            }
        };
        if !token.is_cancelled() {
            debug!("Cancelling remaining jobs");
            token.cancel();
        }
        errors.push(failure);
    }
    errors.into_result()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
    }
}
