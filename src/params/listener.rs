use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, Span};
use url::Url;

use crate::error::BoxError;
use crate::lifecycle::{AcquireData, ConfigureData, EnvParam, ShutdownData};
use crate::registry::{Describe, TypeDescriptor};

const SCHEMES: [&str; 3] = ["tcp", "tcp4", "tcp6"];

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("parsing listener URL {raw:?}: {source}")]
    Url {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported listener network {0:?}")]
    UnsupportedNetwork(String),

    #[error("listener URL {0:?} has no host:port")]
    MissingAddress(String),

    #[error("listening on {network} {address:?}: {source}")]
    Bind {
        network: String,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A TCP listen address, bound during the Acquire phase.
///
/// The text form is a URL whose scheme names the network: `tcp://0.0.0.0:8080`.
/// Port `0` picks a free port, see [`Listener::local_addr`].
pub struct Listener {
    network: String,
    address: String,
    span: Mutex<Span>,
    socket: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Listener {
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The configured `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The bound address, once acquired.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands the bound socket over. Returns `None` before Acquire or after a
    /// previous `take`.
    pub fn take(&self) -> Option<TcpListener> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl FromStr for Listener {
    type Err = ListenerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(raw).map_err(|source| ListenerError::Url {
            raw: raw.to_string(),
            source,
        })?;
        if !SCHEMES.contains(&url.scheme()) {
            return Err(ListenerError::UnsupportedNetwork(url.scheme().to_string()));
        }
        let (Some(host), Some(port)) = (url.host_str(), url.port()) else {
            return Err(ListenerError::MissingAddress(raw.to_string()));
        };

        Ok(Self {
            network: url.scheme().to_string(),
            address: format!("{host}:{port}"),
            span: Mutex::new(Span::none()),
            socket: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("network", &self.network)
            .field("address", &self.address)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[async_trait]
impl EnvParam for Listener {
    async fn configure(&self, _ctx: &CancellationToken, data: &ConfigureData) -> Result<(), BoxError> {
        *self.span.lock().unwrap_or_else(PoisonError::into_inner) = data.span.clone();
        Ok(())
    }

    async fn acquire(&self, _ctx: &CancellationToken, _data: &AcquireData) -> Result<(), BoxError> {
        let socket = TcpListener::bind(&self.address)
            .await
            .map_err(|source| ListenerError::Bind {
                network: self.network.clone(),
                address: self.address.clone(),
                source,
            })?;
        let local_addr = socket.local_addr()?;

        let span = self.span.lock().unwrap_or_else(PoisonError::into_inner).clone();
        span.in_scope(|| info!(network = %self.network, %local_addr, "Listening"));

        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local_addr);
        *self.socket.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket);
        Ok(())
    }

    async fn shutdown(&self, _ctx: &CancellationToken, _data: &ShutdownData) -> Result<(), BoxError> {
        if self.take().is_some() {
            info!(address = %self.address, "Listener closed");
        }
        Ok(())
    }
}

impl Describe for Listener {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::text::<Self>().with_lifecycle::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let listener: Listener = "tcp://127.0.0.1:8080".parse().unwrap();
        assert_eq!(listener.network(), "tcp");
        assert_eq!(listener.address(), "127.0.0.1:8080");

        assert!(matches!(
            "udp://127.0.0.1:53".parse::<Listener>(),
            Err(ListenerError::UnsupportedNetwork(_))
        ));
        assert!(matches!(
            "tcp://localhost".parse::<Listener>(),
            Err(ListenerError::MissingAddress(_))
        ));
        assert!(matches!("::".parse::<Listener>(), Err(ListenerError::Url { .. })));
    }

    #[tokio::test]
    async fn test_acquire_binds_and_shutdown_releases() {
        let ctx = CancellationToken::new();
        let data = ConfigureData::new();
        let listener: Listener = "tcp://127.0.0.1:0".parse().unwrap();

        listener.configure(&ctx, &data).await.unwrap();
        assert!(listener.local_addr().is_none());

        let data = data.into_acquire();
        listener.acquire(&ctx, &data).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let data = data.into_shutdown();
        listener.shutdown(&ctx, &data).await.unwrap();
        listener.shutdown(&ctx, &data).await.unwrap();
        assert!(listener.take().is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let ctx = CancellationToken::new();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let raw = format!("tcp://{}", taken.local_addr().unwrap());
        let listener: Listener = raw.parse().unwrap();

        let err = listener
            .acquire(&ctx, &AcquireData::default())
            .await
            .unwrap_err();
        assert!(err.is::<ListenerError>());
    }
}
