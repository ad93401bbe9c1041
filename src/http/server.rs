use std::future::IntoFuture;
use crate::core::error::Result;
use crate::http::routes::router;
use crate::http::AppState;

/// Serve the API until SIGINT/SIGTERM. After the signal the accept loop
/// stops and in-flight requests drain, bounded by the configured shutdown
/// timeout; either way every engine is then flushed and closed.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "http server listening");

    // The drain timer must start at the signal, not at startup
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let graceful = async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(graceful).into_future();
    tokio::pin!(server);

    let drain_deadline = async {
        let _ = signal_rx.await;
        tokio::time::sleep(state.config.shutdown_timeout).await;
    };

    tokio::select! {
        result = &mut server => {
            result?;
            tracing::info!("in-flight requests drained");
        }
        _ = drain_deadline => {
            tracing::warn!(
                timeout_secs = state.config.shutdown_timeout.as_secs(),
                "drain timeout elapsed, abandoning in-flight requests"
            );
        }
    }

    tracing::info!("closing engines");
    state.manager.close_all()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, stopping accept loop");
}
