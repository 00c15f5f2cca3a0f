//! Shutdown coordination.
//!
//! One termination request moves the bridge from `Running` to
//! `ShuttingDown`: the shared cancellation token fires, which stops the
//! acceptor (closing the listener), releases anyone waiting for an admission
//! slot and keeps the launcher from starting new children. Children that are
//! already running finish on their own. Once every tracked task is done the
//! phase becomes `Drained`.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Exit status used when a second termination request forces an exit.
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    ShuttingDown,
    Drained,
}

/// Owns the cancellation broadcast and the completion tracker.
#[derive(Debug)]
pub struct Coordinator {
    cancel: CancellationToken,
    tracker: TaskTracker,
    phase: watch::Sender<Phase>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            phase,
        }
    }

    /// Token every component observes; cancelled once by [`Self::begin`].
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tracker that every spawned session task is registered with.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Enter `ShuttingDown`. Only the first call has an effect.
    pub fn begin(&self) {
        let entered = self.phase.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::ShuttingDown;
                true
            } else {
                false
            }
        });
        if entered {
            info!("shutting down...");
            self.cancel.cancel();
        }
    }

    /// Wait for all tracked tasks, then enter `Drained`.
    pub async fn drained(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.phase.send_replace(Phase::Drained);
        info!("all sessions finished");
    }
}

/// Resolves on the first termination request (SIGINT, or SIGTERM on unix).
///
/// Afterwards a watcher task is left behind that exits the process
/// immediately on a further request, since the handlers installed here
/// replace the default disposition for good.
pub async fn termination_requested() {
    wait_for_signal().await;
    tokio::spawn(async {
        wait_for_signal().await;
        warn!("second termination request, exiting immediately");
        std::process::exit(FORCED_EXIT_CODE);
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
