//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM/SIGINT on the main thread
//! - Translate the signal into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling on a current-thread runtime
//! - Worker threads never touch the runtime

use std::io;

use crate::lifecycle::Shutdown;

/// Wait for the first termination signal and return its name.
pub async fn wait_for_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}

/// Block the calling thread until a termination signal, then trigger `shutdown`.
pub fn block_until_signal(shutdown: &Shutdown) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let name = runtime.block_on(wait_for_signal())?;
    tracing::info!(signal = name, "Shutdown signal received");
    shutdown.trigger();
    Ok(())
}
