//! State module for tracking crawl progress
//!
//! This module provides the in-memory model of a crawl session.
//!
//! # Components
//!
//! - `Phase`: the active stage of the crawl state machine
//! - `WorkQueue`: a resumable list/set pair walked by a cursor
//! - `CrawlState`: the checkpoint unit holding every queue and all results

mod crawl_state;
mod phase;

// Re-export main types
pub use crawl_state::{CrawlState, WorkQueue};
pub use phase::Phase;
