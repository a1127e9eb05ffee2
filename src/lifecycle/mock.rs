//! # Mock Resource Parameters
//!
//! [`MockParam`] is a resource parameter that does nothing but write every hook
//! invocation into a [`Journal`]. Sharing one journal between several mocks records
//! the global call order, which is what orchestrator tests assert on.
//!
//! ```rust
//! use app_bootstrap::lifecycle::mock::{Journal, MockParam};
//! use app_bootstrap::lifecycle::{ConfigureData, Orchestrator, Phase};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     // 1. Setup mocks sharing one journal
//!     let journal = Journal::new();
//!     let db = MockParam::new("db").with_journal(journal.clone());
//!     let cache = MockParam::new("cache")
//!         .with_journal(journal.clone())
//!         .fail_on(Phase::Acquire);
//!
//!     // 2. Drive them
//!     let mut orchestrator = Orchestrator::new();
//!     orchestrator.push("DB", &db).push("CACHE", &cache);
//!     let result = orchestrator
//!         .run(&CancellationToken::new(), ConfigureData::new(), || async {})
//!         .await;
//!
//!     // 3. The failed acquisition rolled `db` back
//!     assert!(result.is_err());
//!     db.verify(&[Phase::Configure, Phase::Acquire, Phase::Shutdown]);
//!     cache.verify(&[Phase::Configure, Phase::Acquire]);
//! }
//! ```
//!
//! Mocks can also be declared as record fields. Their text form is the mock's name,
//! optionally followed by `!phase` markers selecting the phases that fail
//! (`db!acquire`, `cache!configure!shutdown`).

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{AcquireData, ConfigureData, EnvParam, Phase, ShutdownData};
use crate::error::BoxError;
use crate::registry::{Describe, TypeDescriptor};

/// Shared, ordered record of hook invocations.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(String, Phase)>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, phase: Phase) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), phase));
    }

    pub fn entries(&self) -> Vec<(String, Phase)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of the mocks that went through `phase`, in call order.
    pub fn names(&self, phase: Phase) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(_, p)| *p == phase)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn count(&self, name: &str, phase: Phase) -> usize {
        self.entries()
            .iter()
            .filter(|(n, p)| n == name && *p == phase)
            .count()
    }
}

#[derive(Debug, Error)]
#[error("mock {name} failed {phase}")]
pub struct MockFailure {
    pub name: String,
    pub phase: Phase,
}

/// A resource parameter recording its lifecycle calls.
#[derive(Debug, Default)]
pub struct MockParam {
    name: String,
    journal: Journal,
    failing: Vec<Phase>,
}

impl MockParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Makes the hook for `phase` fail (after it is recorded).
    pub fn fail_on(mut self, phase: Phase) -> Self {
        self.failing.push(phase);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Phases this mock went through, in order.
    pub fn calls(&self) -> Vec<Phase> {
        self.journal
            .entries()
            .into_iter()
            .filter(|(name, _)| *name == self.name)
            .map(|(_, phase)| phase)
            .collect()
    }

    /// Panics unless this mock went through exactly `expected`.
    pub fn verify(&self, expected: &[Phase]) {
        let calls = self.calls();
        if calls != expected {
            panic!(
                "mock {} expected calls {:?}, got {:?}",
                self.name, expected, calls
            );
        }
    }

    fn hook(&self, phase: Phase) -> Result<(), BoxError> {
        self.journal.record(&self.name, phase);
        if self.failing.contains(&phase) {
            return Err(Box::new(MockFailure {
                name: self.name.clone(),
                phase,
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl EnvParam for MockParam {
    async fn configure(&self, _ctx: &CancellationToken, _data: &ConfigureData) -> Result<(), BoxError> {
        self.hook(Phase::Configure)
    }

    async fn acquire(&self, _ctx: &CancellationToken, _data: &AcquireData) -> Result<(), BoxError> {
        self.hook(Phase::Acquire)
    }

    async fn shutdown(&self, _ctx: &CancellationToken, _data: &ShutdownData) -> Result<(), BoxError> {
        self.hook(Phase::Shutdown)
    }
}

#[derive(Debug, Error)]
#[error("unknown mock phase {0:?}")]
pub struct UnknownPhase(String);

impl FromStr for MockParam {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('!');
        let mut param = MockParam::new(parts.next().unwrap_or_default());
        for phase in parts {
            param = param.fail_on(match phase {
                "configure" => Phase::Configure,
                "acquire" => Phase::Acquire,
                "shutdown" => Phase::Shutdown,
                other => return Err(UnknownPhase(other.to_string())),
            });
        }
        Ok(param)
    }
}

impl Describe for MockParam {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::text::<Self>().with_lifecycle::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_form() {
        let param: MockParam = "db!acquire!shutdown".parse().unwrap();
        assert_eq!(param.name(), "db");
        assert_eq!(param.failing, [Phase::Acquire, Phase::Shutdown]);
        assert!("db!explode".parse::<MockParam>().is_err());
    }

    #[tokio::test]
    async fn test_failing_hook_is_still_recorded() {
        let param = MockParam::new("db").fail_on(Phase::Configure);
        let result = param
            .configure(&CancellationToken::new(), &ConfigureData::new())
            .await;
        assert!(result.is_err());
        param.verify(&[Phase::Configure]);
        assert_eq!(param.journal().count("db", Phase::Configure), 1);
    }
}
