//! Graceful shutdown: wait for a termination signal, then drain the engine.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::inference::engine::EngineAdapter;

/// Resolves on Ctrl-C or (on Unix) SIGTERM.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Await `signal`, then move the engine through Draining to Stopped.
///
/// Intended for `axum::serve(..).with_graceful_shutdown(..)`: once this
/// resolves the listener stops accepting connections.
pub async fn drain_on<F>(signal: F, engine: Arc<EngineAdapter>, drain_timeout: Duration)
where
    F: std::future::Future<Output = ()>,
{
    signal.await;
    info!("Shutdown signal received");
    engine.shutdown(drain_timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::inference::backend::EchoBackendFactory;
    use crate::inference::lifecycle::LifecyclePhase;

    #[tokio::test]
    async fn test_drain_on_stops_engine() {
        let engine = Arc::new(EngineAdapter::new(
            EngineConfig::default(),
            Arc::new(EchoBackendFactory),
        ));
        engine.initialize().await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(drain_on(
            async move {
                let _ = rx.await;
            },
            engine.clone(),
            Duration::from_millis(50),
        ));

        assert_eq!(engine.phase(), LifecyclePhase::Ready);
        tx.send(()).unwrap();
        task.await.unwrap();
        assert_eq!(engine.phase(), LifecyclePhase::Stopped);
    }
}
