use std::future::Future;
use std::io;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and skipped; the remaining
/// signal and the token itself still end the wait.
pub async fn cancel_on_shutdown(token: CancellationToken) {
    tokio::select! {
        () = signal_or_pending("Ctrl+C", signal::ctrl_c()) => {}
        () = signal_or_pending("SIGTERM", sigterm()) => {}
        () = token.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, stopping app server");
    token.cancel();
}

/// Resolve when `signal` fires. Never resolves if listening for it failed.
async fn signal_or_pending<F>(name: &'static str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("Received {name} signal"),
        Err(e) => {
            tracing::error!(%e, "Failed to listen for {name}, waiting on other shutdown triggers");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn sigterm() -> io::Result<()> {
    let mut signal_handler = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    signal_handler.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn sigterm() -> io::Result<()> {
    std::future::pending().await
}
