//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the phase state machine of a crawl job
//! - `CrawlJob`: in-memory state of one running job (queue, failure set, counters)

mod crawl_job;
mod crawl_phase;

// Re-export main types
pub use crawl_job::CrawlJob;
pub use crawl_phase::{CrawlPhase, TransitionError};
