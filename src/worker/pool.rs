//! Worker pool
//!
//! Spawns workers as tokio tasks, hands each its own shutdown signal and
//! collects their published state for statistics.

use crate::config::{TelemetryConfig, WorkersConfig};
use crate::dispatcher::Dispatcher;
use crate::processor::PageProcessor;
use crate::telemetry::WorkerTelemetry;
use crate::worker::runner::Worker;
use crate::worker::state::{PoolStats, WorkerState, WorkerStats};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<WorkerState>,
    join: JoinHandle<()>,
}

/// A set of workers sharing one dispatcher and one page processor
pub struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    processor: Arc<dyn PageProcessor>,
    config: WorkersConfig,
    telemetry: TelemetryConfig,
    workers: Mutex<BTreeMap<String, WorkerHandle>>,
    next_id: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        processor: Arc<dyn PageProcessor>,
        config: WorkersConfig,
        telemetry: TelemetryConfig,
    ) -> Self {
        Self {
            dispatcher,
            processor,
            config,
            telemetry,
            workers: Mutex::new(BTreeMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Starts `count` workers and returns their ids
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, count: usize) -> Vec<String> {
        info!("Starting {} workers", count);
        (0..count).map(|_| self.add_worker()).collect()
    }

    /// Starts one more worker and returns its id
    pub fn add_worker(&self) -> String {
        let id = format!("worker-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let telemetry =
            WorkerTelemetry::new(self.telemetry.step_window, self.telemetry.recent_timings);
        let state = WorkerState::new(id.clone(), telemetry);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(state.clone());

        let worker = Worker {
            dispatcher: Arc::clone(&self.dispatcher),
            processor: Arc::clone(&self.processor),
            config: self.config.clone(),
            state,
            state_tx,
            shutdown: shutdown_rx,
        };
        let join = tokio::spawn(worker.run());

        self.lock().insert(
            id.clone(),
            WorkerHandle {
                shutdown: shutdown_tx,
                state: state_rx,
                join,
            },
        );
        id
    }

    /// Signals one worker to stop and waits for it to exit
    ///
    /// Returns false if no worker has that id.
    pub async fn remove_worker(&self, id: &str) -> bool {
        let Some(handle) = self.lock().remove(id) else {
            return false;
        };

        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.join.await {
            warn!("Worker {} exited abnormally: {}", id, e);
        }
        info!("Removed worker {}", id);
        true
    }

    /// Signals every worker to stop and waits for all of them
    ///
    /// Items already being processed finish first. Returns the final state
    /// of the stopped workers; calling this on a stopped pool returns empty
    /// stats.
    pub async fn stop(&self) -> PoolStats {
        let handles: Vec<(String, WorkerHandle)> = std::mem::take(&mut *self.lock())
            .into_iter()
            .collect();
        if handles.is_empty() {
            return PoolStats::default();
        }

        info!("Stopping {} workers", handles.len());
        for (_, handle) in &handles {
            let _ = handle.shutdown.send(true);
        }

        let mut workers = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            if let Err(e) = handle.join.await {
                warn!("Worker {} exited abnormally: {}", id, e);
            }
            workers.push(WorkerStats::from_state(&handle.state.borrow(), false));
        }
        info!("All workers stopped");

        PoolStats {
            total_workers: workers.len(),
            running: 0,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of every worker's last published state
    pub fn stats(&self) -> PoolStats {
        let workers: Vec<WorkerStats> = self
            .lock()
            .values()
            .map(|handle| {
                let alive = !handle.join.is_finished();
                WorkerStats::from_state(&handle.state.borrow(), alive)
            })
            .collect();

        PoolStats {
            total_workers: workers.len(),
            running: workers.iter().filter(|w| w.running).count(),
            workers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, WorkerHandle>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
