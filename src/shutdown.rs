use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Install a handler for SIGINT (Ctrl-C) and, on unix, SIGTERM.
///
/// Returns a token that is cancelled when either signal arrives. If a handler
/// cannot be installed the error is logged and that signal is ignored.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c() => info!("🛑 Received SIGINT, shutting down"),
            _ = terminate() => info!("🛑 Received SIGTERM, shutting down"),
        }
        trigger.cancel();
    });

    token
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install SIGINT handler: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
