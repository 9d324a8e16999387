//! End-to-end zoning run: sample, classify, export, summarize.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fieldzones_cloud::ImageryService;
use fieldzones_core::{Region, SampleSet, ZoneAssignment};

use crate::classifier::ZoneClassifier;
use crate::config::{PipelineConfig, RunParams};
use crate::error::{PipelineError, Result};
use crate::export::{ExportOutcome, ZoneExporter};
use crate::geometry::{load_region_from_archive, LoadedBoundary};
use crate::report::ReportSummary;
use crate::sampler::FeatureSampler;

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

/// Allows one run at a time. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard when dropped.
#[derive(Debug)]
pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<RunPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        Ok(RunPermit {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Stage about to start, reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sampling,
    Classifying,
    Exporting,
    Reporting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Sampling => "Sampling imagery",
            Stage::Classifying => "Classifying zones",
            Stage::Exporting => "Submitting zone export",
            Stage::Reporting => "Summarizing",
        };
        f.write_str(s)
    }
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub samples: SampleSet,
    pub assignment: ZoneAssignment,
    pub export: ExportOutcome,
    pub report: ReportSummary,
}

/// Runs the zoning stages against one imagery service.
pub struct ZonePipeline<'a> {
    service: &'a dyn ImageryService,
    config: PipelineConfig,
    guard: RunGuard,
}

impl<'a> ZonePipeline<'a> {
    pub fn new(service: &'a dyn ImageryService, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            service,
            config,
            guard: RunGuard::new(),
        })
    }

    /// Share `guard` with other pipelines so that only one of them runs at
    /// a time.
    pub fn with_guard(mut self, guard: RunGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Load a boundary archive with the configured polygon policy.
    pub fn load_boundary(&self, archive: &Path) -> Result<LoadedBoundary> {
        load_region_from_archive(archive, self.config.polygon_policy)
    }

    pub fn run(&self, region: &Region, params: &RunParams) -> Result<RunOutcome> {
        self.run_with_progress(region, params, &mut |_| {})
    }

    /// Like [`run`](Self::run), calling `on_stage` before each stage.
    pub fn run_with_progress(
        &self,
        region: &Region,
        params: &RunParams,
        on_stage: &mut dyn FnMut(Stage),
    ) -> Result<RunOutcome> {
        let _permit = self.guard.try_acquire()?;
        params.validate()?;
        tracing::info!(
            "Zoning run: {} zone(s), {}, backend {}",
            params.zones,
            params.window,
            self.service.name()
        );

        on_stage(Stage::Sampling);
        let samples = FeatureSampler::new(self.service, &self.config).sample(region, &params.window)?;

        on_stage(Stage::Classifying);
        let assignment = ZoneClassifier::new(&self.config).classify(&samples, params.zones)?;

        on_stage(Stage::Exporting);
        let export = ZoneExporter::new(self.service, &self.config).export(region, &samples, &assignment)?;

        on_stage(Stage::Reporting);
        let report = ReportSummary::build(&params.window, &samples, &assignment)?;

        Ok(RunOutcome {
            samples,
            assignment,
            export,
            report,
        })
    }
}
