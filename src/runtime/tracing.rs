//! # Observability & Tracing
//!
//! [`setup_tracing`] installs the process-wide subscriber: a compact `fmt` layer
//! without module targets, filtered by an [`EnvFilter`].
//!
//! ## Levels
//!
//! The runner installs the subscriber *before* the configuration is decoded, so
//! that decoding failures are logged too, and then switches to the configured level
//! through [`TracingHandle::set_level`]. `RUST_LOG` directives always win over the
//! configured level:
//!
//! ```bash
//! # Level from the decoded configuration
//! LOG_LEVEL=debug ./service
//!
//! # Per-module override
//! RUST_LOG=info,app_bootstrap::lifecycle=trace ./service
//! ```
//!
//! ## What Gets Traced
//!
//! | Level | Events                                                           |
//! |-------|------------------------------------------------------------------|
//! | INFO  | effective environment, acquired/released resources, listeners    |
//! | DEBUG | decoded fields (key, type, from_default), configured resources   |
//! | TRACE | unset fields, interrupted jobs                                   |
//!
//! Installing twice is harmless: the second call leaves the first subscriber in
//! place and returns a handle that does nothing.

use tracing::level_filters::LevelFilter;
use tracing::{warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// Adjusts the level of the subscriber installed by [`setup_tracing`].
#[derive(Debug, Clone)]
pub struct TracingHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
}

impl TracingHandle {
    /// Whether this handle controls the installed subscriber.
    pub fn is_installed(&self) -> bool {
        self.reload.is_some()
    }

    pub fn set_level(&self, level: Level) {
        let Some(reload) = &self.reload else {
            return;
        };
        if let Err(err) = reload.reload(env_filter(level)) {
            warn!(error = %err, %level, "Cannot change log level");
        }
    }
}

/// Installs the global subscriber at `level`.
pub fn setup_tracing(level: Level) -> TracingHandle {
    let (filter, reload) = reload::Layer::new(env_filter(level));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .is_ok();

    TracingHandle {
        reload: installed.then_some(reload),
    }
}
