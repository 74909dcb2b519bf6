//! Integration tests for crawl-queue
//!
//! `dispatch_tests` drive the dispatcher directly against on-disk and
//! in-memory databases. `crawl_tests` run the worker pool end-to-end
//! against wiremock servers.

mod crawl_tests;
mod dispatch_tests;
