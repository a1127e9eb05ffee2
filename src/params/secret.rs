use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BoxError;
use crate::lifecycle::{ConfigureData, EnvParam};
use crate::registry::{Describe, TypeDescriptor};
use crate::secrets::{Secret, SecretError};

/// A secret address resolved against the secret engine during Configure.
///
/// The address is whatever the engine understands: `file:DB_PASSWORD`, an inline
/// `data:` URL, or the empty string for an empty secret.
pub struct SecretParam {
    address: String,
    secret: RwLock<Option<Arc<dyn Secret>>>,
}

impl SecretParam {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Reads the secret. Fails with [`SecretError::NotSet`] before Configure.
    pub async fn get(&self, ctx: &CancellationToken) -> Result<Vec<u8>, SecretError> {
        let secret = self
            .secret
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SecretError::NotSet)?;
        secret.get(ctx).await
    }
}

impl FromStr for SecretParam {
    type Err = std::convert::Infallible;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            address: address.to_string(),
            secret: RwLock::new(None),
        })
    }
}

impl fmt::Debug for SecretParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretParam")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EnvParam for SecretParam {
    async fn configure(&self, ctx: &CancellationToken, data: &ConfigureData) -> Result<(), BoxError> {
        let engine = data.secrets.as_ref().ok_or(SecretError::EngineNotConfigured)?;
        let secret = engine.get_secret(ctx, &self.address).await?;
        *self.secret.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(secret));
        debug!(address = %self.address, "Secret resolved");
        Ok(())
    }
}

impl Describe for SecretParam {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::text::<Self>().with_lifecycle::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{ConstantEngine, MultiEngine};

    #[tokio::test]
    async fn test_resolves_through_engine() {
        let ctx = CancellationToken::new();
        let engine = MultiEngine::new().with_storage("vault", ConstantEngine::new("hunter2"));
        let data = ConfigureData::new().with_secrets(Arc::new(engine));

        let param: SecretParam = "vault:db/password".parse().unwrap();
        assert!(matches!(param.get(&ctx).await, Err(SecretError::NotSet)));

        param.configure(&ctx, &data).await.unwrap();
        assert_eq!(param.get(&ctx).await.unwrap(), b"hunter2");
    }

    #[tokio::test]
    async fn test_requires_engine() {
        let ctx = CancellationToken::new();
        let param: SecretParam = "data:,inline".parse().unwrap();
        let err = param
            .configure(&ctx, &ConfigureData::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SecretError>(),
            Some(SecretError::EngineNotConfigured)
        ));
    }
}
