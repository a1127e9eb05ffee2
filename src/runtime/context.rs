use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{AppName, AppVersion};

/// Identity of the running application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppMeta {
    pub name: AppName,
    pub version: AppVersion,
}

/// Builds the root token of the process: it is cancelled on Ctrl-C, and on
/// SIGTERM on Unix.
///
/// Must be called inside a tokio runtime.
pub fn build_context(name: AppName, version: AppVersion) -> (CancellationToken, AppMeta) {
    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));
    (token, AppMeta { name, version })
}

async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            token.cancel();
        }
        () = token.cancelled() => {}
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_context_carries_identity() {
        let (token, meta) = build_context(AppName::new("svc", "Service"), AppVersion::default());
        assert!(!token.is_cancelled());
        assert_eq!(meta.name.name(), "svc");
        token.cancel();
    }
}
