//! State module for queue entries and visits
//!
//! # Components
//!
//! - `EntryState`: lifecycle of a work queue entry (pending, claimed, done, failed)
//! - `VisitStatus`: outcome stored in the visit ledger (success, failure)

mod entry_state;

// Re-export main types
pub use entry_state::{EntryState, VisitStatus};
