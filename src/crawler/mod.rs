//! Crawler module for orchestrating a crawl session
//!
//! This module contains the core crawling logic, including:
//! - The phase state machine driving seed, battle and player fetches
//! - Periodic checkpoints and partial exports
//! - Cooperative pause and resume
//! - The observer surface consumed by front ends

mod coordinator;
mod observer;

pub use crate::fetch::StopSignal;
pub use coordinator::{CrawlOutcome, Coordinator};
pub use observer::{CrawlObserver, NoopObserver, TracingObserver};
