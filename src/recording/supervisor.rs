//! Interceptor installation and displacement recovery

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::network::{EntryPoint, Fetch, OwnerToken};

/// The interceptor's claim on an entry point
pub struct Installation {
    entry: Arc<EntryPoint>,
    original: Arc<dyn Fetch>,
    interceptor: Arc<dyn Fetch>,
    token: OwnerToken,
    injections: AtomicU64,
    wanted: AtomicBool,
}

impl Installation {
    pub(crate) fn new(
        entry: Arc<EntryPoint>,
        original: Arc<dyn Fetch>,
        interceptor: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            entry,
            original,
            interceptor,
            token: OwnerToken::next(),
            injections: AtomicU64::new(0),
            wanted: AtomicBool::new(false),
        }
    }

    /// Install the interceptor unless it is already the active entry point
    ///
    /// Returns true if an installation happened.
    pub fn install(&self) -> bool {
        self.wanted.store(true, Ordering::Release);
        if self.entry.install(Arc::clone(&self.interceptor), self.token) {
            let count = self.injections.fetch_add(1, Ordering::Relaxed) + 1;
            info!("Interceptor installed (injection #{count})");
            true
        } else {
            debug!("Interceptor already installed");
            false
        }
    }

    /// Install the interceptor even if it is already active
    pub fn force(&self) {
        self.wanted.store(true, Ordering::Release);
        self.entry.force_install(Arc::clone(&self.interceptor), self.token);
        let count = self.injections.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Interceptor reinstalled (injection #{count})");
    }

    /// Restore the original entry point if the interceptor still holds it
    ///
    /// Supervisors stop reinstalling until the next explicit install.
    pub fn uninstall(&self) -> bool {
        self.wanted.store(false, Ordering::Release);
        let restored = self.entry.restore(Arc::clone(&self.original), self.token);
        if restored {
            info!("Interceptor removed, original entry point restored");
        } else {
            warn!("Interceptor not active, leaving entry point untouched");
        }
        restored
    }

    /// Whether the interceptor is the active entry point
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.entry.is_owned_by(self.token)
    }

    /// Whether the interceptor should be active, i.e. not explicitly uninstalled
    #[must_use]
    pub fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::Acquire)
    }

    /// Number of installations performed
    #[must_use]
    pub fn injections(&self) -> u64 {
        self.injections.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installation")
            .field("token", &self.token)
            .field("injections", &self.injections())
            .field("wanted", &self.is_wanted())
            .finish_non_exhaustive()
    }
}

/// Periodically puts the interceptor back when something displaced it
///
/// Best effort: a displacement followed by another within one interval can go
/// unnoticed until the next check.
#[derive(Debug)]
pub struct Supervisor {
    installation: Arc<Installation>,
    interval: Duration,
    startup_delays: Vec<Duration>,
}

impl Supervisor {
    /// Create a supervisor for `installation`
    #[must_use]
    pub fn new(installation: Arc<Installation>, config: &SupervisorConfig) -> Self {
        Self {
            installation,
            interval: config.interval(),
            startup_delays: config.startup_delays(),
        }
    }

    /// Check once, reinstalling if displaced
    ///
    /// Returns true if a reinstallation happened. Does nothing after an
    /// explicit uninstall.
    pub fn reconcile(&self) -> bool {
        if !self.installation.is_wanted() || self.installation.is_current() {
            return false;
        }
        warn!("Network entry point was replaced, reinstalling interceptor");
        self.installation.install()
    }

    /// Run the startup checks and then the polling loop in the background
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime
    #[must_use]
    pub fn spawn(self) -> SupervisorHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let started = Instant::now();

        let task = tokio::spawn(async move {
            for delay in &self.startup_delays {
                tokio::select! {
                    () = tokio::time::sleep_until(started + *delay) => {
                        debug!("Delayed installation check after {}ms", delay.as_millis());
                        self.reconcile();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Supervisor stopped during startup checks");
                        return;
                    }
                }
            }

            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.reconcile();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Supervisor shutting down");
                        break;
                    }
                }
            }
        });

        SupervisorHandle { shutdown_tx, task }
    }
}

/// Handle to a running supervisor
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Stop the supervisor and wait for it to exit
    pub async fn shutdown(self) {
        self.shutdown_tx.send(()).ok();
        if let Err(e) = self.task.await {
            warn!("Supervisor task failed: {}", e);
        }
    }

    /// Whether the background task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
