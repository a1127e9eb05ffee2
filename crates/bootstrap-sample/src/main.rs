//! # Bootstrap Sample
//!
//! A tiny TCP greeter wired up entirely from the environment.
//!
//! ## 🚀 What it shows
//!
//! 1.  Declaring a configuration record with [`record!`], including a nested record
//!     and resource parameters ([`Listener`], [`SecretParam`]).
//! 2.  Handing it to [`run`], which decodes, binds and releases everything.
//! 3.  Running the accept loop and a heartbeat side by side with [`run_all`]: the
//!     first one to fail, or Ctrl-C, stops both.
//!
//! ## Environment
//!
//! | Variable                | Default               |
//! |-------------------------|-----------------------|
//! | `HTTP_ADDR`             | `tcp://127.0.0.1:8080`|
//! | `GREETING_SECRET`       | `data:,hello`         |
//! | `SECRET_STORAGES`       | empty                 |
//! | `HEARTBEAT_ENABLED`     | `true`                |
//! | `HEARTBEAT_INTERVAL`    | `10s`                 |
//! | `LOG_LEVEL`             | `info`                |
//!
//! ```bash
//! HTTP_ADDR=tcp://127.0.0.1:9000 LOG_LEVEL=debug cargo run -p bootstrap-sample
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use app_bootstrap::app::{AppName, AppVersion};
use app_bootstrap::error::BoxError;
use app_bootstrap::params::{Listener, SecretParam};
use app_bootstrap::record;
use app_bootstrap::runtime::{build_context, run, ActionConfig, AppContext, ExitCode, RunOptions};
use app_bootstrap::scheduler::{cancellable, job, run_all, Interrupted};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Level};
use url::Url;

#[derive(Debug, Default)]
struct Heartbeat {
    enabled: bool,
    interval: Duration,
}

record! {
    Heartbeat {
        enabled: default = "true";
        interval: default = "10s";
    }
}

#[derive(Debug, Default)]
struct Config {
    http: Option<Listener>,
    greeting: Option<SecretParam>,
    secret_storages: BTreeMap<String, Url>,
    heartbeat: Heartbeat,
    log_level: Option<Level>,
}

record! {
    Config {
        http: key = "HTTP_ADDR", default = "tcp://127.0.0.1:8080";
        greeting: key = "GREETING_SECRET", default = "data:,hello";
        secret_storages: separator = ";", kv_separator = "=", default = "";
        heartbeat: prefix = "HEARTBEAT_";
        log_level: default = "info";
    }
}

impl ActionConfig for Config {
    fn log_level(&self) -> Level {
        self.log_level.unwrap_or(Level::INFO)
    }

    fn secret_dsns(&self) -> BTreeMap<String, Option<Url>> {
        self.secret_storages
            .iter()
            .map(|(scheme, dsn)| (scheme.clone(), Some(dsn.clone())))
            .collect()
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let (ctx, meta) = build_context(
        AppName::new("bootstrap-sample", "Bootstrap Sample"),
        AppVersion::new(env!("CARGO_PKG_VERSION"), "", ""),
    );

    run(&ctx, RunOptions::new().meta(meta), serve).await.into()
}

async fn serve(ctx: CancellationToken, app: AppContext<Config>) -> ExitCode {
    // 1. Read the greeting once, it does not change while running
    let greeting = match &app.config().greeting {
        Some(greeting) => greeting.get(&ctx).await,
        None => Ok(Vec::new()),
    };
    let greeting = match greeting {
        Ok(greeting) => greeting,
        Err(err) => {
            error!(error = %err, "Reading greeting");
            return ExitCode::FAILURE;
        }
    };

    // 2. Take the bound socket out of its parameter
    let Some(listener) = app.config().http.as_ref().and_then(Listener::take) else {
        error!("Listener was not acquired");
        return ExitCode::FAILURE;
    };

    // 3. Serve until Ctrl-C or the first failure
    let mut jobs = vec![job(move |ctx| accept_loop(ctx, listener, greeting))];
    let heartbeat_config = &app.config().heartbeat;
    let interval = heartbeat_config.interval;
    if heartbeat_config.enabled && !interval.is_zero() {
        jobs.push(job(move |ctx| heartbeat(ctx, interval)));
    }
    match run_all(&ctx, jobs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors) => {
            error!(errors = %errors, "Serving failed");
            ExitCode::FAILURE
        }
    }
}

async fn accept_loop(
    ctx: CancellationToken,
    listener: TcpListener,
    greeting: Vec<u8>,
) -> Result<(), BoxError> {
    loop {
        let (mut stream, peer) = cancellable(&ctx, listener.accept()).await??;
        debug!(%peer, "Accepted connection");

        let greeting = greeting.clone();
        tokio::spawn(async move {
            if let Err(err) = stream.write_all(&greeting).await {
                debug!(%peer, error = %err, "Writing greeting");
            }
        });
    }
}

async fn heartbeat(ctx: CancellationToken, interval: Duration) -> Result<(), Interrupted> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        cancellable(&ctx, ticker.tick()).await?;
        info!("Still serving");
    }
}
