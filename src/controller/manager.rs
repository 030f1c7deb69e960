// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Serializes reconciliation passes and coalesces the triggers that request them.

use crate::reconcile::{PassResult, Reconciler, Status, Trigger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument};

/// What happened to a trigger handed to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A re-run was queued
    Queued,
    /// A re-run was already pending and will observe the latest inputs
    Coalesced,
    /// The controller has stopped
    Closed,
}

/// Handle to request passes from the Controller
#[derive(Clone)]
pub struct ControllerHandle {
    trigger_tx: mpsc::Sender<Trigger>,
    removing: Arc<AtomicBool>,
}

impl ControllerHandle {
    /// Request a pass. Never blocks; at most one re-run is pending at a time.
    pub fn send(&self, trigger: Trigger) -> Dispatch {
        // Latched so it survives coalescing
        if trigger == Trigger::Remove {
            self.removing.store(true, Ordering::SeqCst);
        }

        match self.trigger_tx.try_send(trigger) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Full(_)) => {
                debug!("Pass already pending, coalescing {:?}", trigger);
                Dispatch::Coalesced
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Controller stopped, dropping {:?}", trigger);
                Dispatch::Closed
            }
        }
    }
}

/// Runs one pass at a time, requeueing retryable outcomes
pub struct Controller {
    reconciler: Reconciler,
    trigger_rx: mpsc::Receiver<Trigger>,
    removing: Arc<AtomicBool>,
    retry_interval: Duration,
    retry_at: Option<Instant>,
    /// Torn down; only an input change brings the provisioner back
    removed: bool,
}

impl Controller {
    pub fn new(reconciler: Reconciler, retry_interval: Duration) -> (Self, ControllerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let removing = Arc::new(AtomicBool::new(false));

        let controller = Self {
            reconciler,
            trigger_rx,
            removing: removing.clone(),
            retry_interval,
            retry_at: None,
            removed: false,
        };

        let handle = ControllerHandle { trigger_tx, removing };
        (controller, handle)
    }

    /// Start dormant, as after a completed teardown
    pub fn start_removed(mut self) -> Self {
        self.removed = true;
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Controller started, waiting for triggers...");

        loop {
            let trigger = match self.retry_at {
                Some(deadline) => {
                    let rx = &mut self.trigger_rx;
                    tokio::select! {
                        Some(trigger) = rx.recv() => trigger,
                        _ = sleep_until(deadline) => Trigger::PeriodicResync,
                    }
                }
                None => match self.trigger_rx.recv().await {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            self.process(trigger).await;
        }

        info!("Controller stopped");
        Ok(())
    }

    /// Run the pass for one trigger, or the teardown once removal was requested
    #[instrument(skip(self))]
    pub async fn process(&mut self, trigger: Trigger) {
        self.retry_at = None;

        if trigger == Trigger::Remove || self.removing.load(Ordering::SeqCst) {
            let outcome = self.reconciler.run_teardown().await;
            if outcome.retryable {
                self.retry_at = Some(Instant::now() + self.retry_interval);
            } else if outcome.removed {
                self.removing.store(false, Ordering::SeqCst);
                self.removed = true;
                info!("Provisioner removed, waiting for new inputs");
            }
            return;
        }

        if self.removed {
            if !matches!(trigger, Trigger::ConfigChanged | Trigger::RelationChanged) {
                debug!("Provisioner removed, ignoring {:?}", trigger);
                return;
            }
            info!("Inputs changed after removal, redeploying");
            self.removed = false;
        }

        let rx = &self.trigger_rx;
        let result = self.reconciler.run_pass(trigger, &|| !rx.is_empty()).await;

        if let PassResult::Completed(report) = &result {
            if report.outcome.status == Status::Blocked && report.outcome.retryable {
                debug!("Retrying in {:?}", self.retry_interval);
                self.retry_at = Some(Instant::now() + self.retry_interval);
            }
        }
    }
}

/// Send a periodic resync trigger until the controller stops
pub async fn resync(handle: ControllerHandle, period: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if handle.send(Trigger::PeriodicResync) == Dispatch::Closed {
            return Ok(());
        }
    }
}
