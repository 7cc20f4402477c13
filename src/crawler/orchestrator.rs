//! Crawl orchestrator
//!
//! This module drives one crawl job through its phases:
//! property record, building list, then the units of every building. A
//! failing building never aborts the job; it is queued for the retry pass
//! instead. Only the property and building-list phases can fail a job.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::PhaseFetchers;
use crate::crawler::pacing::{pause, Clock};
use crate::state::{CrawlJob, CrawlPhase};
use crate::storage::{lock_sink, Building, SharedSink};
use crate::{FetchError, FetchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Summary of a finished crawl job
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    /// Row id of the job in the sink
    pub job_id: i64,
    pub property_id: String,
    /// Terminal phase: `Done` or `Cancelled`
    pub phase: CrawlPhase,
    pub buildings_total: usize,
    pub units_saved: usize,
    /// Buildings whose first unit fetch failed, in discovery order
    pub first_pass_failures: Vec<String>,
    /// Buildings still failing after the last retry pass
    pub residual_failures: Vec<String>,
    pub retry_passes: u32,
    pub error: Option<String>,
}

impl CrawlReport {
    pub fn is_complete(&self) -> bool {
        self.phase == CrawlPhase::Done && self.residual_failures.is_empty()
    }
}

/// Runs crawl jobs against a set of phase fetchers and a sink
pub struct CrawlOrchestrator {
    fetchers: PhaseFetchers,
    sink: SharedSink,
    config: CrawlerConfig,
    clock: Arc<dyn Clock>,
    config_hash: String,
}

/// Per-run bookkeeping that does not belong to the job state machine
struct Run<'a> {
    job: CrawlJob,
    job_id: i64,
    /// Wait owed before the next request
    owed_wait: Option<Duration>,
    cancel: &'a CancellationToken,
}

impl CrawlOrchestrator {
    pub fn new(
        fetchers: PhaseFetchers,
        sink: SharedSink,
        config: CrawlerConfig,
        clock: Arc<dyn Clock>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            fetchers,
            sink,
            config,
            clock,
            config_hash: config_hash.into(),
        }
    }

    /// Crawls one property
    ///
    /// # Arguments
    ///
    /// * `property_id` - A property id resolved by a verification session
    /// * `cancel` - Observed between requests; an in-flight request is never interrupted
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The job reached `Done` or `Cancelled`
    /// * `Err(FetchError::PhaseFatal)` - The property or building-list phase failed
    /// * `Err(FetchError::UnresolvedProperty)` - `property_id` is blank
    pub async fn run(
        &self,
        property_id: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<CrawlReport> {
        let job = CrawlJob::new(property_id).ok_or(FetchError::UnresolvedProperty)?;
        let job_id = lock_sink(&self.sink)?.begin_job(job.property_id(), &self.config_hash)?;

        tracing::info!(
            "Starting crawl job {} for property {}",
            job_id,
            job.property_id()
        );

        let mut run = Run {
            job,
            job_id,
            owed_wait: None,
            cancel,
        };
        let outcome = self.drive(&mut run).await;

        if let Err(e) = &outcome {
            run.job.set_error(e.to_string());
            if run.job.phase().is_active() {
                // Unexpected errors outside a phase still end the job
                if let Err(te) = run.job.transition(CrawlPhase::Failed) {
                    tracing::error!("{}", te);
                }
            }
        }

        let finished = lock_sink(&self.sink)
            .and_then(|mut sink| sink.finish_job(job_id, run.job.phase(), run.job.error()));
        if let Err(se) = finished {
            tracing::error!("Could not record the end of crawl job {}: {}", job_id, se);
            outcome?;
            return Err(se.into());
        }
        outcome?;

        let job = &run.job;
        tracing::info!(
            "Crawl job {} finished as {}: {} buildings, {} units, {} residual failures",
            job_id,
            job.phase(),
            job.buildings().len(),
            job.units_saved(),
            job.failures().len()
        );

        Ok(CrawlReport {
            job_id,
            property_id: job.property_id().to_string(),
            phase: job.phase(),
            buildings_total: job.buildings().len(),
            units_saved: job.units_saved(),
            first_pass_failures: job.first_pass_failures().to_vec(),
            residual_failures: job.failures().to_vec(),
            retry_passes: job.retry_passes(),
            error: job.error().map(String::from),
        })
    }

    async fn drive(&self, run: &mut Run<'_>) -> FetchResult<()> {
        // ===== Property =====
        if !self.pace(run).await? {
            return Ok(());
        }
        let property_id = run.job.property_id().to_string();
        let fetched = self.fetchers.property.fetch_property(&property_id).await;
        run.owed_wait = Some(self.config.request_delay());
        let saved = fetched.and_then(|property| {
            lock_sink(&self.sink)?.save_property(&property)?;
            Ok(property)
        });
        match saved {
            Ok(property) => tracing::info!("Property {}: {}", property_id, property.name),
            Err(e) => return Err(phase_fatal(&mut run.job, e)),
        }

        if self.stop_if_cancelled(run)? {
            return Ok(());
        }
        run.job.transition(CrawlPhase::FetchingBuildingList)?;

        // ===== Building list =====
        if !self.pace(run).await? {
            return Ok(());
        }
        let fetched = self.fetchers.buildings.fetch_buildings(&property_id).await;
        run.owed_wait = Some(self.config.request_delay());
        let saved = fetched.and_then(|buildings| {
            let dropped = run.job.set_buildings(buildings);
            if dropped > 0 {
                tracing::warn!(
                    "Property {}: ignoring {} repeated building links",
                    property_id,
                    dropped
                );
            }
            lock_sink(&self.sink)?.save_buildings(&property_id, run.job.buildings())?;
            Ok(())
        });
        if let Err(e) = saved {
            return Err(phase_fatal(&mut run.job, e));
        }

        tracing::info!(
            "Property {} has {} buildings",
            property_id,
            run.job.buildings().len()
        );

        if self.stop_if_cancelled(run)? {
            return Ok(());
        }
        if run.job.buildings().is_empty() {
            run.job.transition(CrawlPhase::Done)?;
            return Ok(());
        }
        run.job.transition(CrawlPhase::FetchingUnits)?;

        // ===== Units, first pass =====
        if !self.unit_pass(run, 0).await? {
            return Ok(());
        }
        run.job.close_first_pass();

        // ===== Retry passes =====
        while !run.job.failures().is_empty() && run.job.retry_passes() < self.config.max_retry_passes
        {
            if self.stop_if_cancelled(run)? {
                return Ok(());
            }
            run.job.transition(CrawlPhase::Retrying)?;
            run.owed_wait = Some(self.config.retry_backoff());

            tracing::info!(
                "Retry pass {} over {} buildings",
                run.job.retry_passes(),
                run.job.failures().len()
            );

            let pass = run.job.retry_passes();
            if !self.unit_pass(run, pass).await? {
                return Ok(());
            }
        }

        if !run.job.failures().is_empty() {
            let residual = run.job.failures().join(", ");
            tracing::warn!(
                "Property {}: buildings still failing after {} retry passes: {}",
                property_id,
                run.job.retry_passes(),
                residual
            );
            run.job
                .set_error(format!("unit fetch failed for buildings: {}", residual));
        }

        if self.stop_if_cancelled(run)? {
            return Ok(());
        }
        run.job.transition(CrawlPhase::Done)?;
        Ok(())
    }

    /// Fetches every pending building once
    ///
    /// Returns false when the pass was stopped by cancellation.
    async fn unit_pass(&self, run: &mut Run<'_>, pass: u32) -> FetchResult<bool> {
        for building in run.job.pending_buildings() {
            if self.stop_if_cancelled(run)? || !self.pace(run).await? {
                return Ok(false);
            }
            self.fetch_building(run, &building, pass).await;
        }
        Ok(true)
    }

    /// Fetches and stores one building's units, isolating any failure
    async fn fetch_building(&self, run: &mut Run<'_>, building: &Building, pass: u32) {
        let property_id = run.job.property_id().to_string();
        let attempt = run.job.record_attempt(&building.id);
        tracing::debug!(
            "Fetching units of building {} (attempt {})",
            building.id,
            attempt
        );

        let fetched = self
            .fetchers
            .units
            .fetch_units(&property_id, &building.id)
            .await;
        run.owed_wait = Some(self.config.request_delay());

        let saved = fetched
            .and_then(|units| {
                lock_sink(&self.sink)?.save_units(&property_id, &building.id, &units)?;
                Ok(units.len())
            })
            .map_err(|source| FetchError::BuildingFetch {
                building_id: building.id.clone(),
                source: Box::new(source),
            });

        match saved {
            Ok(count) => {
                tracing::info!("Building {} ({}): {} units", building.id, building.name, count);
                run.job.record_success(&building.id, count);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                run.job.record_failure(&building.id);
                let recorded = lock_sink(&self.sink).and_then(|mut sink| {
                    sink.record_building_failure(run.job_id, &building.id, pass, &e.to_string())
                });
                if let Err(se) = recorded {
                    tracing::warn!("Could not record failure of building {}: {}", building.id, se);
                }
            }
        }
    }

    /// Waits the delay owed since the previous request
    ///
    /// Returns false, after moving the job to `Cancelled`, when cancellation
    /// is observed before or during the wait.
    async fn pace(&self, run: &mut Run<'_>) -> FetchResult<bool> {
        if self.stop_if_cancelled(run)? {
            return Ok(false);
        }
        if let Some(wait) = run.owed_wait.take() {
            if !pause(self.clock.as_ref(), wait, run.cancel).await {
                self.stop_if_cancelled(run)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn stop_if_cancelled(&self, run: &mut Run<'_>) -> FetchResult<bool> {
        if !run.cancel.is_cancelled() {
            return Ok(false);
        }
        if run.job.phase().is_active() {
            tracing::info!(
                "Crawl job {} cancelled during {}",
                run.job_id,
                run.job.phase()
            );
            run.job.transition(CrawlPhase::Cancelled)?;
        }
        Ok(true)
    }
}

/// Fails the job in its current phase and wraps the cause
fn phase_fatal(job: &mut CrawlJob, source: FetchError) -> FetchError {
    let phase = job.phase();
    tracing::error!(
        "Property {}: {} failed: {}",
        job.property_id(),
        phase,
        source
    );

    if let Err(e) = job.transition(CrawlPhase::Failed) {
        return e.into();
    }

    FetchError::PhaseFatal {
        phase,
        property_id: job.property_id().to_string(),
        source: Box::new(source),
    }
}
