//! # Resource Lifecycle
//!
//! Some configuration values are more than data: a listen address turns into a bound
//! socket, a secret address into a handle on a secret storage. Such values implement
//! [`EnvParam`] and are driven through three phases by the [`Orchestrator`]:
//!
//! ```text
//! Unconfigured ──configure──▶ Configured ──acquire──▶ Acquired ──shutdown──▶ Closed
//! ```
//!
//! | Phase     | Purpose                                             | Failure policy                           |
//! |-----------|-----------------------------------------------------|------------------------------------------|
//! | Configure | wiring only: read phase data, no sockets, no tasks  | all failures collected, nothing acquired |
//! | Acquire   | side effects: bind, connect, spawn                  | acquired resources are rolled back       |
//! | Shutdown  | best-effort release                                 | all failures collected                   |
//!
//! # Discovery
//!
//! Resource parameters are found *after* decoding, by a second read-only walk over
//! the populated record ([`Orchestrator::discover`]). A type opts in by attaching the
//! lifecycle capability to its descriptor:
//!
//! ```rust
//! use app_bootstrap::error::BoxError;
//! use app_bootstrap::lifecycle::{ConfigureData, EnvParam};
//! use app_bootstrap::registry::{Describe, TypeDescriptor};
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! struct Pool(String);
//!
//! impl std::str::FromStr for Pool {
//!     type Err = std::convert::Infallible;
//!     fn from_str(s: &str) -> Result<Self, Self::Err> {
//!         Ok(Pool(s.to_string()))
//!     }
//! }
//!
//! #[async_trait]
//! impl EnvParam for Pool {
//!     async fn configure(&self, _: &CancellationToken, _: &ConfigureData) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! impl Describe for Pool {
//!     fn describe() -> TypeDescriptor {
//!         TypeDescriptor::text::<Self>().with_lifecycle::<Self>()
//!     }
//! }
//! ```
//!
//! Hooks take `&self`: the decoded record stays shared between the orchestrator and
//! the application action, so implementations keep their acquired state behind
//! interior mutability.

mod data;
mod error;
pub mod mock;
mod orchestrator;

pub use data::{AcquireData, ConfigureData, ShutdownData};
pub use error::{LifecycleError, PhaseError};
pub use orchestrator::Orchestrator;

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// A configuration value with a Configure → Acquire → Shutdown lifecycle.
///
/// Only [`EnvParam::configure`] is required. The other hooks default to doing nothing.
#[async_trait]
pub trait EnvParam: Send + Sync {
    /// Wires the parameter from the phase data. Must not bind or spawn anything.
    async fn configure(
        &self,
        ctx: &CancellationToken,
        data: &ConfigureData,
    ) -> Result<(), BoxError>;

    /// Acquires the underlying resource.
    async fn acquire(&self, _ctx: &CancellationToken, _data: &AcquireData) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases the resource. Must tolerate a resource that was never acquired.
    async fn shutdown(
        &self,
        _ctx: &CancellationToken,
        _data: &ShutdownData,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Configure,
    Acquire,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Configure => "configuring",
            Phase::Acquire => "acquiring",
            Phase::Shutdown => "shutting down",
        })
    }
}

/// Where a resource parameter stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unconfigured,
    Configured,
    Acquired,
    ShuttingDown,
    Closed,
}
