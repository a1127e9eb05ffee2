//! # Secrets
//!
//! A [`SecretEngine`] resolves secret *addresses* into [`Secret`] handles. The
//! address grammar is `scheme:key`, where the scheme picks a storage inside a
//! [`MultiEngine`]:
//!
//! | Address                        | Resolves to                                  |
//! |--------------------------------|----------------------------------------------|
//! | *(empty)*                      | an empty secret                              |
//! | `data:;base64,aHVudGVyMg==`    | the inline bytes (base64 or percent-encoded) |
//! | `file:DB_PASSWORD`             | `DB_PASSWORD` from the `file` storage        |
//!
//! Storages are configured per scheme with a DSN (see [`build_secret_engine`]):
//! `file:///run/secrets/app.env` loads a dotenv file, `data:,value` serves one
//! constant for every key.
//!
//! Secrets are read lazily through [`Secret::get`], so a storage may fetch or
//! rotate values on demand.

mod data_url;
mod file;
mod multi;

pub use data_url::decode_data_url;
pub use file::FileEngine;
pub use multi::{build_secret_engine, MultiEngine};

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, MultiError};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found")]
    NotFound,

    #[error("secret not set")]
    NotSet,

    #[error("secrets engine not configured")]
    EngineNotConfigured,

    #[error("secrets engine is closed")]
    Closed,

    #[error("storage {0:?} is unset")]
    Unset(String),

    #[error("unsupported secret storage scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("no storage for scheme {0:?}")]
    NoStorage(String),

    #[error("invalid secret address {0:?}")]
    InvalidAddress(String),

    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("storage {scheme:?}: {source}")]
    Storage {
        scheme: String,
        #[source]
        source: BoxError,
    },

    #[error("closing storages:\n{0}")]
    Close(MultiError<SecretError>),
}

/// A lazily readable secret value.
#[async_trait]
pub trait Secret: Send + Sync {
    async fn get(&self, ctx: &CancellationToken) -> Result<Vec<u8>, SecretError>;
}

/// Resolves secret addresses.
#[async_trait]
pub trait SecretEngine: Send + Sync {
    async fn get_secret(
        &self,
        ctx: &CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn Secret>, SecretError>;

    /// Releases the engine. Closing twice is harmless.
    async fn close(&self) -> Result<(), SecretError> {
        Ok(())
    }
}

/// A secret held in memory.
#[derive(Clone)]
pub struct PlainSecret {
    data: Vec<u8>,
}

impl PlainSecret {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl fmt::Debug for PlainSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainSecret")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Secret for PlainSecret {
    async fn get(&self, _ctx: &CancellationToken) -> Result<Vec<u8>, SecretError> {
        Ok(self.data.clone())
    }
}

/// The secret behind an empty address.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySecret;

#[async_trait]
impl Secret for EmptySecret {
    async fn get(&self, _ctx: &CancellationToken) -> Result<Vec<u8>, SecretError> {
        Ok(Vec::new())
    }
}

/// Serves the same bytes for every key.
#[derive(Clone)]
pub struct ConstantEngine {
    data: Vec<u8>,
}

impl ConstantEngine {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl fmt::Debug for ConstantEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantEngine").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretEngine for ConstantEngine {
    async fn get_secret(
        &self,
        _ctx: &CancellationToken,
        _addr: &str,
    ) -> Result<Box<dyn Secret>, SecretError> {
        Ok(Box::new(PlainSecret::new(self.data.clone())))
    }
}

/// A declared storage without a DSN. Every lookup fails.
#[derive(Debug, Clone)]
pub struct UnsetEngine {
    scheme: String,
}

impl UnsetEngine {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }
}

#[async_trait]
impl SecretEngine for UnsetEngine {
    async fn get_secret(
        &self,
        _ctx: &CancellationToken,
        _addr: &str,
    ) -> Result<Box<dyn Secret>, SecretError> {
        Err(SecretError::Unset(self.scheme.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_constant_engine_ignores_key() {
        let ctx = CancellationToken::new();
        let engine = ConstantEngine::new("s3cr3t");
        let secret = engine.get_secret(&ctx, "anything").await.unwrap();
        assert_eq!(secret.get(&ctx).await.unwrap(), b"s3cr3t");
    }

    #[tokio::test]
    async fn test_unset_engine_fails() {
        let ctx = CancellationToken::new();
        let err = UnsetEngine::new("vault")
            .get_secret(&ctx, "x")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SecretError::Unset(scheme) if scheme == "vault"));
    }

    #[test]
    fn test_plain_secret_debug_is_redacted() {
        let debug = format!("{:?}", PlainSecret::new("hunter2"));
        assert!(!debug.contains("hunter2"));
    }
}
