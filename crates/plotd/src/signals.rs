//! Shutdown signal handling.
//!
//! The daemon saves its plots before exiting, so termination requests are
//! turned into an orderly return from [`wait_for_shutdown`] instead of an
//! immediate exit.

use std::fmt;
use tokio::signal;
use tracing::info;

/// Which signal ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    #[cfg_attr(unix, allow(dead_code))]
    CtrlC,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::CtrlC => write!(f, "Ctrl+C"),
        }
    }
}

/// Waits for SIGINT or SIGTERM (Ctrl+C on Windows).
///
/// # Returns
///
/// The signal received, or an error if handlers could not be installed.
pub async fn wait_for_shutdown() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    let received = {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => ShutdownSignal::Interrupt,
            _ = sigterm.recv() => ShutdownSignal::Terminate,
        }
    };

    #[cfg(not(unix))]
    let received = {
        signal::ctrl_c().await?;
        ShutdownSignal::CtrlC
    };

    info!("📡 Received {}", received);
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::CtrlC.to_string(), "Ctrl+C");
    }
}
