//! Worker state and statistics
//!
//! A `WorkerState` is written only by its worker, which publishes a clone
//! after every item. Readers build `WorkerStats` from the last published
//! clone.

use crate::telemetry::{Step, StepSummary, UrlTiming, WorkerTelemetry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Live state of one worker
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: String,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub processed_count: u64,
    pub failed_count: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub telemetry: WorkerTelemetry,
}

impl WorkerState {
    pub fn new(id: impl Into<String>, telemetry: WorkerTelemetry) -> Self {
        Self {
            id: id.into(),
            running: true,
            started_at: Utc::now(),
            processed_count: 0,
            failed_count: 0,
            last_activity: None,
            telemetry,
        }
    }
}

/// Read-only view of one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: String,
    pub running: bool,
    /// False once the worker task has exited
    pub thread_alive: bool,
    pub started_at: DateTime<Utc>,
    pub processed_count: u64,
    pub failed_count: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub step_timings: BTreeMap<Step, StepSummary>,
    /// Newest first
    pub recent_timings: Vec<UrlTiming>,
}

impl WorkerStats {
    pub(crate) fn from_state(state: &WorkerState, thread_alive: bool) -> Self {
        Self {
            id: state.id.clone(),
            running: state.running && thread_alive,
            thread_alive,
            started_at: state.started_at,
            processed_count: state.processed_count,
            failed_count: state.failed_count,
            last_activity: state.last_activity,
            step_timings: state.telemetry.summary(),
            recent_timings: state.telemetry.recent(),
        }
    }
}

/// Read-only view of the whole pool
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub running: usize,
    pub workers: Vec<WorkerStats>,
}

impl PoolStats {
    pub fn total_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed_count).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.failed_count).sum()
    }
}
