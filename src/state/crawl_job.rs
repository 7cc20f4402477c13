//! In-memory state of one crawl job
//!
//! A `CrawlJob` lives only for the duration of an orchestrator run. It tracks
//! the current phase, the building queue in site order, and which buildings
//! are still failing.

use crate::state::crawl_phase::{CrawlPhase, TransitionError};
use crate::storage::Building;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct CrawlJob {
    property_id: String,
    phase: CrawlPhase,
    buildings: Vec<Building>,
    /// Building ids still failing, in discovery order
    failures: Vec<String>,
    first_pass_failures: Vec<String>,
    retry_passes: u32,
    attempts: HashMap<String, u32>,
    units_saved: usize,
    error: Option<String>,
}

impl CrawlJob {
    /// Creates a job for a resolved property id
    ///
    /// Returns None for a blank id: a job never exists without one.
    pub fn new(property_id: &str) -> Option<Self> {
        let property_id = property_id.trim();
        if property_id.is_empty() {
            return None;
        }

        Some(Self {
            property_id: property_id.to_string(),
            phase: CrawlPhase::FetchingProperty,
            buildings: Vec::new(),
            failures: Vec::new(),
            first_pass_failures: Vec::new(),
            retry_passes: 0,
            attempts: HashMap::new(),
            units_saved: 0,
            error: None,
        })
    }

    pub fn property_id(&self) -> &str {
        &self.property_id
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Moves the job to a new phase, rejecting transitions the state machine forbids
    pub fn transition(&mut self, to: CrawlPhase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }

        tracing::debug!(
            "Job for property {}: {} -> {}",
            self.property_id,
            self.phase,
            to
        );
        self.phase = to;

        if to == CrawlPhase::Retrying {
            self.retry_passes += 1;
        }

        Ok(())
    }

    /// Stores the building queue returned by the building-list phase
    ///
    /// A building linked more than once keeps only its first entry, so each
    /// building is fetched once per pass. Returns how many entries were dropped.
    pub fn set_buildings(&mut self, buildings: Vec<Building>) -> usize {
        let listed = buildings.len();
        let mut seen = HashSet::new();
        self.buildings = buildings
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .collect();
        listed - self.buildings.len()
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    /// Buildings to fetch in the current phase, in discovery order
    ///
    /// The first pass covers the whole queue; a retry pass covers only the
    /// buildings still in the failure set.
    pub fn pending_buildings(&self) -> Vec<Building> {
        match self.phase {
            CrawlPhase::FetchingUnits => self.buildings.clone(),
            CrawlPhase::Retrying => self
                .buildings
                .iter()
                .filter(|b| self.failures.contains(&b.id))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Counts one unit-fetch attempt for a building
    pub fn record_attempt(&mut self, building_id: &str) -> u32 {
        let count = self.attempts.entry(building_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, building_id: &str) -> u32 {
        self.attempts.get(building_id).copied().unwrap_or(0)
    }

    pub fn record_success(&mut self, building_id: &str, units: usize) {
        self.failures.retain(|id| id != building_id);
        self.units_saved += units;
    }

    pub fn record_failure(&mut self, building_id: &str) {
        if !self.failures.iter().any(|id| id == building_id) {
            self.failures.push(building_id.to_string());
        }
    }

    /// Snapshots the failure set at the end of the first pass
    pub fn close_first_pass(&mut self) {
        self.first_pass_failures = self.failures.clone();
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn first_pass_failures(&self) -> &[String] {
        &self.first_pass_failures
    }

    pub fn retry_passes(&self) -> u32 {
        self.retry_passes
    }

    pub fn units_saved(&self) -> usize {
        self.units_saved
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
