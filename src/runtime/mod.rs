//! # Runtime
//!
//! [`run`] is the whole startup/shutdown sequence of a process in one call:
//!
//! 1. Snapshot the environment.
//! 2. Decode the [`ActionConfig`] record.
//! 3. Switch logging to the configured level.
//! 4. Log the effective environment.
//! 5. Load trust material and build the secret engine.
//! 6. Configure and acquire every resource parameter, run the action, shut down.
//!
//! Every failure is logged and turned into an [`ExitCode`]: `1` for bad input or a
//! failed lifecycle phase, `2` for a configuration type the decoder cannot handle.
//!
//! ```rust,no_run
//! use app_bootstrap::app::{AppName, AppVersion};
//! use app_bootstrap::params::Listener;
//! use app_bootstrap::record;
//! use app_bootstrap::runtime::{build_context, run, ActionConfig, AppContext, ExitCode, RunOptions};
//!
//! #[derive(Debug, Default)]
//! struct Config {
//!     http: Option<Listener>,
//! }
//!
//! record! { Config { http: key = "HTTP_ADDR" } }
//!
//! impl ActionConfig for Config {}
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let (ctx, meta) = build_context(AppName::new("demo", "Demo"), AppVersion::default());
//!     let code = run(&ctx, RunOptions::new().meta(meta), |_ctx, app: AppContext<Config>| async move {
//!         let listener = app.config().http.as_ref().and_then(Listener::take);
//!         tracing::info!(bound = listener.is_some(), "Running");
//!         ExitCode::SUCCESS
//!     })
//!     .await;
//!     code.into()
//! }
//! ```

mod context;
pub mod tracing;

pub use self::context::{build_context, AppMeta};
pub use self::tracing::{setup_tracing, TracingHandle};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use ::tracing::{debug, error, info, info_span, warn, Instrument, Level, Span};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{AppName, AppVersion};
use crate::decode::{decode_as, effective_environment, DecodeError, DecodeOptions, Environment, Record};
use crate::lifecycle::{ConfigureData, LifecycleError, Orchestrator};
use crate::registry::ParserRegistry;
use crate::secrets::{build_secret_engine, SecretEngine};
use crate::trust::{ClientIdentity, TrustStore};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(pub u8);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// Invalid input or a failed lifecycle phase.
    pub const FAILURE: ExitCode = ExitCode(1);
    /// The configuration type itself is not decodable.
    pub const SCHEMA: ExitCode = ExitCode(2);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.0)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The configuration record of an application run through [`run`].
///
/// Every accessor has a neutral default, so `impl ActionConfig for Config {}` is
/// enough for configurations without logging, TLS or secret settings.
pub trait ActionConfig: Record {
    fn log_level(&self) -> Level {
        Level::INFO
    }

    /// CA certificates to trust, in PEM or DER.
    fn cert_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Client certificate chain and key, both PEM.
    fn client_cert_paths(&self) -> Option<(PathBuf, PathBuf)> {
        None
    }

    /// Secret storages by scheme. See [`build_secret_engine`].
    fn secret_dsns(&self) -> BTreeMap<String, Option<Url>> {
        BTreeMap::new()
    }
}

/// What the action sees of the running application.
pub struct AppContext<C> {
    name: AppName,
    version: AppVersion,
    config: Arc<C>,
    span: Span,
    secrets: Arc<dyn SecretEngine>,
    trust_store: Arc<TrustStore>,
}

impl<C> AppContext<C> {
    pub fn name(&self) -> &AppName {
        &self.name
    }

    pub fn version(&self) -> &AppVersion {
        &self.version
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// The configuration, for handing over to spawned tasks.
    pub fn shared_config(&self) -> Arc<C> {
        Arc::clone(&self.config)
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn secrets(&self) -> &Arc<dyn SecretEngine> {
        &self.secrets
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }
}

impl<C> Clone for AppContext<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version.clone(),
            config: Arc::clone(&self.config),
            span: self.span.clone(),
            secrets: Arc::clone(&self.secrets),
            trust_store: Arc::clone(&self.trust_store),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for AppContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("name", &self.name)
            .field("version", &self.version.to_string())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Inputs of [`run`] that do not come from the environment.
#[derive(Debug, Default)]
pub struct RunOptions {
    environment: Option<Environment>,
    registry: ParserRegistry,
    prefix: String,
    meta: AppMeta,
    install_tracing: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            install_tracing: true,
            ..Self::default()
        }
    }

    /// Decodes from `environment` instead of the process environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Prepended to every environment key.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn meta(mut self, meta: AppMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Leaves the global subscriber alone, for embedding [`run`] in a host that
    /// already set one up.
    pub fn without_tracing(mut self) -> Self {
        self.install_tracing = false;
        self
    }
}

/// Runs `action` between the startup and shutdown of the application.
pub async fn run<C, F, Fut>(ctx: &CancellationToken, options: RunOptions, action: F) -> ExitCode
where
    C: ActionConfig,
    F: FnOnce(CancellationToken, AppContext<C>) -> Fut,
    Fut: Future<Output = ExitCode>,
{
    let RunOptions {
        environment,
        registry,
        prefix,
        meta,
        install_tracing,
    } = options;
    let logging = install_tracing.then(|| setup_tracing(Level::INFO));

    // 1. Snapshot the environment
    let env = environment.unwrap_or_else(Environment::from_process);

    // 2. Decode the configuration
    let options = DecodeOptions::new().prefix(prefix.clone()).context(ctx.clone());
    let config: C = match decode_as(&registry, &env, options) {
        Ok(config) => config,
        Err(err) => return report_decode_error(&err),
    };

    // 3. Logging at the configured level
    if let Some(logging) = &logging {
        logging.set_level(config.log_level());
    }

    // 4. Effective environment
    let effective = effective_environment(&registry, &config, &env, &prefix);
    info!(
        event = "notify.effective_environment",
        environment = ?effective,
        "Effective environment"
    );

    // 5. Trust material and secrets
    let identity = match config.client_cert_paths() {
        Some((cert, key)) => match ClientIdentity::load(&cert, &key) {
            Ok(identity) => Some(identity),
            Err(err) => {
                error!(error = %err, "Loading client certificate");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };
    let trust_store = match TrustStore::load(config.cert_paths().as_slice()) {
        Ok(trust_store) => trust_store,
        Err(err) => {
            error!(error = %err, "Loading CA certificates");
            return ExitCode::FAILURE;
        }
    };
    let secrets: Arc<dyn SecretEngine> = match build_secret_engine(&config.secret_dsns()) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!(error = %err, "Building secret engine");
            return ExitCode::FAILURE;
        }
    };

    let span = info_span!(
        "app",
        app = meta.name.name(),
        version = %meta.version,
    );
    let mut data = ConfigureData::new()
        .with_span(span.clone())
        .with_secrets(Arc::clone(&secrets))
        .with_trust_store(trust_store)
        .with_app_name(meta.name.clone())
        .with_version(meta.version.clone());
    if let Some(identity) = identity {
        data = data.with_identity(identity);
    }

    // 6. Lifecycle around the action
    let config = Arc::new(config);
    let app = AppContext {
        name: meta.name,
        version: meta.version,
        config: Arc::clone(&config),
        span: span.clone(),
        secrets: Arc::clone(&secrets),
        trust_store: Arc::clone(&data.trust_store),
    };
    let orchestrator = Orchestrator::discover_with_prefix(&*config, &prefix);
    debug!(resources = ?orchestrator.keys().collect::<Vec<_>>(), "Resource parameters");

    let action_ctx = ctx.clone();
    let result = orchestrator
        .run(ctx, data, || action(action_ctx, app).instrument(span))
        .await;

    if let Err(err) = secrets.close().await {
        warn!(error = %err, "Closing secret engine");
    }

    match result {
        Ok(code) => {
            info!(%code, "Finished");
            code
        }
        Err(err) => report_lifecycle_error(&err),
    }
}

fn report_decode_error(err: &DecodeError) -> ExitCode {
    if let DecodeError::Schema(schema) = err {
        error!(error = %schema, "Configuration type is not decodable");
        return ExitCode::SCHEMA;
    }

    let missing = err.missing_keys();
    if !missing.is_empty() {
        error!(?missing, "Missing required environment variables");
    }
    for field in err.field_errors().into_iter().filter(|field| !field.is_value_not_set()) {
        error!(key = %field.key, error = %field, "Invalid environment variable");
    }
    ExitCode::FAILURE
}

fn report_lifecycle_error(err: &LifecycleError) -> ExitCode {
    let failures = err.phase_errors();
    if failures.is_empty() {
        error!(error = %err, "Lifecycle failed");
    }
    for failure in failures {
        error!(
            phase = %failure.phase,
            key = %failure.key,
            type_name = failure.type_name,
            error = %failure.source,
            "Resource failed"
        );
    }
    ExitCode::FAILURE
}
