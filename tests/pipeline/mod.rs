//! End-to-end tests of the scan pipeline.
//!
//! Models are built in memory by `common`; tests that need files write them
//! to a temporary directory.

mod models;
mod scenarios;
mod timeout;
