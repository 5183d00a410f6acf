//! Interrupt handling
//!
//! While workers run, an interrupt cancels the run. During cleanup
//! interrupts are ignored so after-worker hooks can finish. Once cleanup is
//! done a further interrupt exits as soon as the output has released the
//! terminal.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::Output;

/// Exit status used when the run is interrupted
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalPhase {
    Armed,
    CleaningUp,
    Restored,
}

/// What an interrupt means right now
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptAction {
    Cancel,
    Ignore,
    Exit,
}

/// Tracks which phase of signal handling the run is in
#[derive(Debug)]
pub struct SignalGate {
    phase: AtomicU8,
}

impl SignalGate {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(SignalPhase::Armed as u8),
        }
    }

    pub fn phase(&self) -> SignalPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => SignalPhase::Armed,
            1 => SignalPhase::CleaningUp,
            _ => SignalPhase::Restored,
        }
    }

    pub fn begin_cleanup(&self) {
        self.phase
            .store(SignalPhase::CleaningUp as u8, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.phase.store(SignalPhase::Restored as u8, Ordering::SeqCst);
    }

    pub fn on_interrupt(&self) -> InterruptAction {
        match self.phase() {
            SignalPhase::Armed => InterruptAction::Cancel,
            SignalPhase::CleaningUp => InterruptAction::Ignore,
            SignalPhase::Restored => InterruptAction::Exit,
        }
    }
}

impl Default for SignalGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Listen for SIGINT/SIGTERM for the rest of the process lifetime
pub fn spawn_listener(
    gate: Arc<SignalGate>,
    token: CancellationToken,
    output: Arc<dyn Output>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_interrupt().await {
                warn!("Failed to listen for signals: {}", e);
                return;
            }

            if let Some(code) = handle_interrupt(&gate, &token, output.as_ref()).await {
                std::process::exit(code);
            }
        }
    })
}

/// React to one interrupt. Returns the exit status when the process should
/// exit now.
async fn handle_interrupt(
    gate: &SignalGate,
    token: &CancellationToken,
    output: &dyn Output,
) -> Option<i32> {
    match gate.on_interrupt() {
        InterruptAction::Cancel => {
            info!("Interrupt received, cancelling run");
            token.cancel();
            None
        }
        InterruptAction::Ignore => {
            info!("Interrupt ignored while cleanup runs");
            None
        }
        InterruptAction::Exit => {
            output.shutdown().await;
            Some(INTERRUPTED_EXIT_CODE)
        }
    }
}

#[cfg(unix)]
async fn wait_for_interrupt() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
