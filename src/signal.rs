//! Signal handling for graceful shutdown.
//!
//! Handles SIGTERM and SIGINT so that the API server can stop accepting
//! connections and remove its socket before exiting.
use tracing::info;

/// Blocks until a shutdown signal is received.
pub async fn recv_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received ctrl-c");
    }

    Ok(())
}
