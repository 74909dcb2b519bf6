//! URL handling module
//!
//! Every URL is canonicalized before it reaches the queue or the ledger, so
//! the canonical string is the natural key for both tables.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::extract_domain;
pub use normalize::canonicalize_url;
