//! Crawler module for the property hierarchy
//!
//! This module contains the core crawling logic, including:
//! - Phase fetchers for property, building list and unit pages
//! - HTML parsing against the registry's fixed markup
//! - Request pacing against an injectable clock
//! - The crawl orchestrator and background job tracking

pub mod fetcher;
mod jobs;
mod orchestrator;
mod pacing;
pub mod parser;

pub use fetcher::{
    build_http_client, BuildingListFetcher, PhaseFetchers, PropertyInfoFetcher, RegistryClient,
    UnitInfoFetcher,
};
pub use jobs::{JobId, JobStatus, JobTracker};
pub use orchestrator::{CrawlOrchestrator, CrawlReport};
pub use pacing::{pause, Clock, ManualClock, TokioClock};
