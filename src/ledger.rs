//! Visit ledger
//!
//! Durable record of the last visit of every canonical URL. The ledger
//! enforces the revisit cooldown: a URL visited within the window is not
//! eligible for admission, however many times it is submitted.

use crate::state::VisitStatus;
use crate::storage::{Storage, StorageResult};
use chrono::{DateTime, Duration, Utc};

/// Default cooldown window between visits of the same URL
pub const DEFAULT_COOLDOWN_SECS: i64 = 24 * 60 * 60;

/// Cooldown rules over the `visits` table
#[derive(Debug, Clone, Copy)]
pub struct VisitLedger {
    cooldown: Duration,
}

impl VisitLedger {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Returns true if `url` may be admitted at `now`
    ///
    /// A URL is ineligible iff it has a visit newer than `now - cooldown`.
    /// Storage errors are returned to the caller, which must treat them as
    /// "not eligible".
    pub fn is_eligible<S: Storage + ?Sized>(
        &self,
        storage: &S,
        url: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let eligible = match storage.get_visit(url)? {
            Some(visit) => visit.last_visited_at <= now - self.cooldown,
            None => true,
        };
        Ok(eligible)
    }

    /// Records a visit of `url` at `at`
    pub fn record_visit<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        url: &str,
        status: VisitStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        storage.upsert_visit(url, status, at)
    }
}

impl Default for VisitLedger {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }
}
