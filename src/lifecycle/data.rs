//! Phase data. Each phase sees everything the previous one saw: [`AcquireData`]
//! dereferences to [`ConfigureData`] and [`ShutdownData`] to [`AcquireData`].

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::Span;

use crate::app::{AppName, AppVersion};
use crate::secrets::SecretEngine;
use crate::trust::{ClientIdentity, TrustStore};

/// Dependencies injected into [`EnvParam::configure`](super::EnvParam::configure).
#[derive(Clone)]
pub struct ConfigureData {
    /// Parent span for everything the parameter logs.
    pub span: Span,
    /// `None` when no secret storage is configured.
    pub secrets: Option<Arc<dyn SecretEngine>>,
    pub trust_store: Arc<TrustStore>,
    pub identity: Option<Arc<ClientIdentity>>,
    pub app_name: AppName,
    pub version: AppVersion,
}

impl ConfigureData {
    pub fn new() -> Self {
        Self {
            span: Span::none(),
            secrets: None,
            trust_store: Arc::new(TrustStore::empty()),
            identity: None,
            app_name: AppName::default(),
            version: AppVersion::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretEngine>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_trust_store(mut self, trust_store: TrustStore) -> Self {
        self.trust_store = Arc::new(trust_store);
        self
    }

    pub fn with_identity(mut self, identity: ClientIdentity) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn with_app_name(mut self, app_name: AppName) -> Self {
        self.app_name = app_name;
        self
    }

    pub fn with_version(mut self, version: AppVersion) -> Self {
        self.version = version;
        self
    }

    pub fn into_acquire(self) -> AcquireData {
        AcquireData { configure: self }
    }
}

impl Default for ConfigureData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigureData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigureData")
            .field("secrets", &self.secrets.is_some())
            .field("trust_store", &self.trust_store.len())
            .field("identity", &self.identity.is_some())
            .field("app_name", &self.app_name)
            .field("version", &self.version.to_string())
            .finish()
    }
}

/// Dependencies injected into [`EnvParam::acquire`](super::EnvParam::acquire).
#[derive(Debug, Clone, Default)]
pub struct AcquireData {
    configure: ConfigureData,
}

impl AcquireData {
    pub fn into_shutdown(self) -> ShutdownData {
        ShutdownData { acquire: self }
    }
}

impl Deref for AcquireData {
    type Target = ConfigureData;

    fn deref(&self) -> &Self::Target {
        &self.configure
    }
}

impl From<ConfigureData> for AcquireData {
    fn from(configure: ConfigureData) -> Self {
        configure.into_acquire()
    }
}

/// Dependencies injected into [`EnvParam::shutdown`](super::EnvParam::shutdown).
#[derive(Debug, Clone, Default)]
pub struct ShutdownData {
    acquire: AcquireData,
}

impl Deref for ShutdownData {
    type Target = AcquireData;

    fn deref(&self) -> &Self::Target {
        &self.acquire
    }
}

impl From<AcquireData> for ShutdownData {
    fn from(acquire: AcquireData) -> Self {
        acquire.into_shutdown()
    }
}
