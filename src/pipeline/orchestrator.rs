//! Single-file pipeline driver

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::differential::{
    Deletion, ReconstructionEngine, ResidualComputer, RetentionManager, VerificationGate,
    VerificationOutcome,
};
use crate::engine::{check_input_format, PcmStore, Resample};
use crate::error::{FomaError, Result};
use crate::pipeline::{ArtifactLayout, PipelineState, SizeReport, StateTracker};
use crate::tier::{TierName, TierPlan, TierPlanner};
use crate::transcode::{PcmFormat, Transcode};

/// A stage-local error the run degraded around
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineState,
    pub artifact: PathBuf,
    pub code: String,
    pub message: String,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub layout: ArtifactLayout,
    pub plan: TierPlan,
    /// Terminal state: `Cleanup` or `RetainAll`
    pub state: PipelineState,
    pub history: Vec<PipelineState>,
    pub failures: Vec<StageFailure>,
    pub verification: VerificationOutcome,
    pub deletions: Vec<Deletion>,
    pub sizes: SizeReport,
}

impl PipelineRun {
    pub fn verified(&self) -> bool {
        self.state == PipelineState::Cleanup
    }
}

/// Runs every stage for one input file
///
/// All capabilities are injected, so the same driver runs against ffmpeg and
/// FLAC files in production and against in-process fakes in tests.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    transcoder: &'a dyn Transcode,
    store: &'a dyn PcmStore,
    resampler: &'a dyn Resample,
    planner: TierPlanner,
    gate: VerificationGate,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        transcoder: &'a dyn Transcode,
        store: &'a dyn PcmStore,
        resampler: &'a dyn Resample,
    ) -> Self {
        Self {
            config,
            transcoder,
            store,
            resampler,
            planner: TierPlanner::new(config.topology()),
            gate: VerificationGate::new(config.threshold_dbfs),
        }
    }

    /// Gate the input format, probe it and plan the tiers
    ///
    /// Writes nothing.
    ///
    /// # Errors
    /// `UnsupportedFormat`, `Probe` or `InvalidTopology`; all fatal.
    pub fn plan(&self, input: &Path) -> Result<TierPlan> {
        check_input_format(input)?;
        let source = self.store.probe(input)?;
        info!(
            "Source: {} Hz, {}-bit, {} channel(s)",
            source.sample_rate, source.bit_depth, source.channels
        );
        self.planner.plan(&source)
    }

    /// Run the whole pipeline for `input`
    ///
    /// Returns `Err` only for fatal errors, before any artifact is written.
    /// Stage-local errors are logged, collected in
    /// [`PipelineRun::failures`], and end in `RetainAll` when they touch a
    /// verified tier.
    pub fn run(&self, input: &Path) -> Result<PipelineRun> {
        info!("Processing {}", input.display());
        let mut tracker = StateTracker::new();
        let mut failures = Vec::new();

        let plan = self.plan(input)?;
        let layout = ArtifactLayout::for_input(input)?;
        let known_tiers: Vec<TierName> = self
            .planner
            .topology()
            .specs()
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        layout.prepare(self.config.output_mode, &known_tiers)?;

        tracker.advance(PipelineState::EncodeTiers)?;
        self.encode_tiers(&plan, &layout, &mut failures);

        tracker.advance(PipelineState::EncodeResiduals)?;
        self.encode_residuals(&plan, &layout, &mut failures);

        tracker.advance(PipelineState::Reconstruct)?;
        self.reconstruct(&plan, &layout, &mut failures);

        tracker.advance(PipelineState::Verify)?;
        let checks: Vec<(TierName, PathBuf)> = plan
            .verified
            .iter()
            .map(|tier| (tier.clone(), layout.reco_residual(tier)))
            .collect();
        if checks.is_empty() {
            info!("No versions to analyze.");
        }
        let verification = self.gate.verify_all(self.store, &checks);
        let verified = verification.passed();

        tracker.advance(if verified {
            PipelineState::Cleanup
        } else {
            PipelineState::RetainAll
        })?;
        let deletions = RetentionManager::new(&layout).apply(verified, &plan.verified);

        if self.config.strip_metadata {
            self.strip_metadata(&plan, &layout, tracker.state(), &mut failures);
        }

        let sizes = SizeReport::collect(&layout, plan.process_sr());
        sizes.log();

        Ok(PipelineRun {
            state: tracker.state(),
            history: tracker.history(),
            layout,
            plan,
            failures,
            verification,
            deletions,
            sizes,
        })
    }

    fn encode_tiers(
        &self,
        plan: &TierPlan,
        layout: &ArtifactLayout,
        failures: &mut Vec<StageFailure>,
    ) {
        let input = layout.input();
        let stage = PipelineState::EncodeTiers;

        if self.config.extract_cover {
            let dest = layout.cover();
            if let Err(e) = self.transcoder.extract_cover(input, &dest) {
                record(failures, stage, &dest, e);
            }
        }

        for tier in &plan.encoded {
            let dest = layout.tier(&tier.name);
            let format = PcmFormat::new(tier.sample_rate, tier.bit_depth);
            if let Err(e) = self.transcoder.encode_flac(input, &dest, format) {
                record(failures, stage, &dest, e);
            }
        }

        for (dest, profile) in [
            (layout.preview(), &self.config.lb_profile),
            (layout.thumbnail(), &self.config.tn_profile),
        ] {
            if let Err(e) = self.transcoder.encode_opus(input, &dest, profile) {
                record(failures, stage, &dest, e);
            }
        }
    }

    fn encode_residuals(
        &self,
        plan: &TierPlan,
        layout: &ArtifactLayout,
        failures: &mut Vec<StageFailure>,
    ) {
        let computer = ResidualComputer::new(self.resampler);

        // Leaf tiers first
        for tier in plan.verified.iter().rev() {
            let Some(base) = plan.tier(tier).and_then(|t| t.base.as_ref()) else {
                continue;
            };
            let dest = layout.residual(tier);
            if let Err(e) = computer.compute_files(
                self.store,
                &layout.tier(base),
                &layout.tier(tier),
                &dest,
            ) {
                record(failures, PipelineState::EncodeResiduals, &dest, e);
            }
        }
    }

    fn reconstruct(
        &self,
        plan: &TierPlan,
        layout: &ArtifactLayout,
        failures: &mut Vec<StageFailure>,
    ) {
        let engine = ReconstructionEngine::new(self.resampler);
        let computer = ResidualComputer::new(self.resampler);
        let stage = PipelineState::Reconstruct;

        for tier in &plan.verified {
            let (Some(root), Some(target)) = (plan.root_of(tier), plan.tier(tier)) else {
                continue;
            };
            let residuals: Vec<PathBuf> = plan
                .residual_cascade(tier)
                .iter()
                .map(|t| layout.residual(t))
                .collect();
            debug!(
                "Rebuilding {} from {} + {} residual(s)",
                tier,
                root,
                residuals.len()
            );

            let reco = layout.reco(tier);
            if let Err(e) = engine.reconstruct_files(
                self.store,
                &layout.tier(root),
                &residuals,
                target.sample_rate,
                &reco,
            ) {
                record(failures, stage, &reco, e);
                continue;
            }

            let reco_residual = layout.reco_residual(tier);
            if let Err(e) =
                computer.compute_files(self.store, &layout.tier(tier), &reco, &reco_residual)
            {
                record(failures, stage, &reco_residual, e);
            }
        }
    }

    /// Strip container metadata from the files that are kept, except `TN`
    fn strip_metadata(
        &self,
        plan: &TierPlan,
        layout: &ArtifactLayout,
        stage: PipelineState,
        failures: &mut Vec<StageFailure>,
    ) {
        let mut targets = vec![layout.preview()];
        targets.extend(
            plan.encoded
                .iter()
                .filter(|tier| tier.base.is_none())
                .map(|tier| layout.tier(&tier.name)),
        );
        targets.extend(plan.verified.iter().map(|tier| layout.residual(tier)));

        for path in targets {
            if !path.exists() {
                debug!("{} not present, metadata left alone", path.display());
                continue;
            }
            if let Err(e) = self.transcoder.strip_metadata(&path) {
                record(failures, stage, &path, e);
            }
        }
    }
}

fn record(
    failures: &mut Vec<StageFailure>,
    stage: PipelineState,
    artifact: &Path,
    err: FomaError,
) {
    warn!("[{}] {}", stage, err);
    failures.push(StageFailure {
        stage,
        artifact: artifact.to_path_buf(),
        code: err.error_code().to_string(),
        message: err.to_string(),
    });
}
