use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::data_url::decode_data_url;
use super::{
    ConstantEngine, EmptySecret, FileEngine, PlainSecret, Secret, SecretEngine, SecretError,
    UnsetEngine,
};
use crate::error::MultiError;

/// Routes addresses to per-scheme storages.
#[derive(Default)]
pub struct MultiEngine {
    closed: AtomicBool,
    storages: BTreeMap<String, Box<dyn SecretEngine>>,
}

impl MultiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(
        mut self,
        scheme: impl Into<String>,
        storage: impl SecretEngine + 'static,
    ) -> Self {
        self.storages.insert(scheme.into(), Box::new(storage));
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.storages.keys().map(String::as_str)
    }
}

impl fmt::Debug for MultiEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiEngine")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("schemes", &self.storages.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl SecretEngine for MultiEngine {
    async fn get_secret(
        &self,
        ctx: &CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn Secret>, SecretError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SecretError::Closed);
        }
        if addr.is_empty() {
            return Ok(Box::new(EmptySecret));
        }
        if addr.starts_with("data:") {
            return Ok(Box::new(PlainSecret::new(decode_data_url(addr)?)));
        }

        let (scheme, key) = split_address(addr)?;
        let storage = self
            .storages
            .get(scheme)
            .ok_or_else(|| SecretError::NoStorage(scheme.to_string()))?;

        storage
            .get_secret(ctx, key)
            .await
            .map_err(|source| SecretError::Storage {
                scheme: scheme.to_string(),
                source: Box::new(source),
            })
    }

    async fn close(&self) -> Result<(), SecretError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors = MultiError::new();
        for (scheme, storage) in &self.storages {
            if let Err(err) = storage.close().await {
                errors.push(SecretError::Storage {
                    scheme: scheme.clone(),
                    source: Box::new(err),
                });
            }
        }
        debug!(storages = self.storages.len(), "Secrets engine closed");
        errors.into_result().map_err(SecretError::Close)
    }
}

/// `scheme:key`, with the scheme following URL scheme syntax.
fn split_address(addr: &str) -> Result<(&str, &str), SecretError> {
    let invalid = || SecretError::InvalidAddress(addr.to_string());
    let (scheme, key) = addr.split_once(':').ok_or_else(invalid)?;

    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(invalid());
    }
    Ok((scheme, key))
}

/// Builds a [`MultiEngine`] from `scheme → DSN`. A `None` DSN declares the scheme
/// without a backing storage.
///
/// Supported storages: `file` (a dotenv file, `file:///path/to/secrets.env`) and
/// `data` (one constant payload).
pub fn build_secret_engine(
    dsns: &BTreeMap<String, Option<Url>>,
) -> Result<MultiEngine, SecretError> {
    let mut engine = MultiEngine::new();
    for (scheme, dsn) in dsns {
        engine = match dsn {
            None => engine.with_storage(scheme.clone(), UnsetEngine::new(scheme.clone())),
            Some(dsn) => {
                let storage = new_storage(dsn).map_err(|source| SecretError::Storage {
                    scheme: scheme.clone(),
                    source: Box::new(source),
                })?;
                info!(%scheme, storage = dsn.scheme(), "Secret storage configured");
                engine.with_storage(scheme.clone(), storage)
            }
        };
    }
    Ok(engine)
}

fn new_storage(dsn: &Url) -> Result<Box<dyn SecretEngine>, SecretError> {
    match dsn.scheme() {
        "file" => Ok(Box::new(FileEngine::open(file_path(dsn))?)),
        "data" => Ok(Box::new(ConstantEngine::new(decode_data_url(dsn.as_str())?))),
        other => Err(SecretError::UnsupportedScheme(other.to_string())),
    }
}

/// Host and path joined, so `file://./secrets.env` stays relative.
fn file_path(dsn: &Url) -> PathBuf {
    match dsn.host_str() {
        Some(host) if !host.is_empty() => {
            PathBuf::from(host).join(dsn.path().trim_start_matches('/'))
        }
        _ => PathBuf::from(dsn.path()),
    }
}

#[async_trait]
impl SecretEngine for Box<dyn SecretEngine> {
    async fn get_secret(
        &self,
        ctx: &CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn Secret>, SecretError> {
        (**self).get_secret(ctx, addr).await
    }

    async fn close(&self) -> Result<(), SecretError> {
        (**self).close().await
    }
}
