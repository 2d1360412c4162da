//! Per-process retarget state and the single-request pipeline.

use std::any::Any;
use std::fs;
use std::iter;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use hashbrown::HashMap;
use log::{debug, error, info, warn};
use same_graph_core::{
    assemble_pose_batch, assemble_skeleton_batch, decode_output, gt_recon, motion_to_pose_graphs,
    skeleton_to_graph, InferenceAdapter, InferenceError, NormalizationStatistics,
};
use same_motion_core::{
    assemble_motion, bvh, load_skeleton, normalize_motion, BvhOptions, HeightVelocityContact,
    Motion,
};

use crate::adapters::load_model;
use crate::config::{OutputNaming, ServerConfig};
use crate::error::RetargetError;
use crate::protocol::{error_reply, success_reply, RetargetRequest};
use crate::state::{RequestState, StateTracker};

/// Result of one retarget.
#[derive(Clone, Debug)]
pub struct RetargetOutcome {
    /// Source motion retargeted onto the target skeleton, in file units.
    pub output: Motion,
    /// Source motion decoded back from its own encoded features.
    pub source_reconstruction: Motion,
    /// Target skeleton decoded from its own batch. Without pose features this
    /// is one rest frame with the root at the corrected rest height.
    pub target_reconstruction: Motion,
}

/// Everything a connection needs after one request.
#[derive(Debug)]
pub struct HandledRequest {
    pub reply: String,
    pub states: Vec<RequestState>,
    pub output: Option<PathBuf>,
    pub timings_ms: HashMap<String, f32>,
}

/// Long-lived state shared by every request: config, statistics, the loaded model.
pub struct RetargetContext {
    config: ServerConfig,
    stats: Arc<NormalizationStatistics>,
    model: Box<dyn InferenceAdapter>,
    counter: AtomicU64,
    output_dir: PathBuf,
}

impl RetargetContext {
    pub fn new(
        config: ServerConfig,
        stats: Arc<NormalizationStatistics>,
        model: Box<dyn InferenceAdapter>,
    ) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("failed to create output dir {}", config.output_dir.display())
        })?;
        let output_dir = fs::canonicalize(&config.output_dir)
            .with_context(|| format!("failed to resolve {}", config.output_dir.display()))?;
        info!(
            "retarget context ready: checkpoint '{}', {} statistics fields, output to {}",
            model.checkpoint(),
            stats.len(),
            output_dir.display()
        );
        Ok(Self {
            config,
            stats,
            model,
            counter: AtomicU64::new(0),
            output_dir,
        })
    }

    /// Load statistics and the configured checkpoint, then build the context.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let stats = match &config.statistics_path {
            Some(path) => NormalizationStatistics::load(path)
                .with_context(|| format!("failed to load statistics from {}", path.display()))?,
            None => {
                warn!("no statistics_path configured; features stay unnormalized");
                NormalizationStatistics::identity()
            }
        };
        let stats = Arc::new(stats);
        let model = load_model(&config.model, Arc::clone(&stats), &config.representation.output)?;
        Self::new(config, stats, model)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<NormalizationStatistics> {
        &self.stats
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn requests_served(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Retarget the motion in `source` onto the skeleton in `target`.
    pub fn retarget(
        &self,
        target: impl AsRef<Path>,
        source: impl AsRef<Path>,
    ) -> Result<RetargetOutcome, RetargetError> {
        let request = RetargetRequest {
            target: target.as_ref().to_path_buf(),
            source: source.as_ref().to_path_buf(),
        };
        let mut tracker = StateTracker::begin_request();
        self.run(&request, &mut tracker, &mut HashMap::new())
    }

    /// Parse, retarget and save one request. Request failures become error replies.
    pub fn handle_request(&self, text: &str) -> HandledRequest {
        let started = Instant::now();
        let mut tracker = StateTracker::begin_request();
        let mut timings_ms = HashMap::new();

        let result = RetargetRequest::parse(text).and_then(|request| {
            let outcome = self.run(&request, &mut tracker, &mut timings_ms)?;
            let path = self.output_path(&request);
            bvh::save(&outcome.output, &path)?;
            Ok((request, outcome, path))
        });

        let (reply, output) = match result {
            Ok((request, outcome, path)) => {
                tracker.transition(RequestState::Responding);
                info!(
                    "retargeted {} onto {}: {} frames -> {}",
                    request.source.display(),
                    request.target.display(),
                    outcome.output.num_frames(),
                    path.display()
                );
                (success_reply(&path), Some(path))
            }
            Err(err) => {
                error!("request failed [{}]: {err}", err.category());
                tracker.transition(RequestState::ErrorResponse);
                tracker.transition(RequestState::Responding);
                (error_reply(&err), None)
            }
        };
        timings_ms.insert("total_ms".to_string(), elapsed_ms(started));

        HandledRequest {
            reply,
            states: tracker.into_history(),
            output,
            timings_ms,
        }
    }

    fn output_path(&self, request: &RetargetRequest) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = match self.config.output_naming {
            OutputNaming::Counter => format!("result_{n}.bvh"),
            OutputNaming::SourceTarget => {
                format!("{}_{}_{n}.bvh", stem(&request.source), stem(&request.target))
            }
        };
        self.output_dir.join(name)
    }

    fn run(
        &self,
        request: &RetargetRequest,
        tracker: &mut StateTracker,
        timings_ms: &mut HashMap<String, f32>,
    ) -> Result<RetargetOutcome, RetargetError> {
        let config = &self.config;
        let stats = self.stats.as_ref();
        let representation = &config.representation;
        let unit_scale = config.normalize.unit_scale;

        // Errors return from whichever stage is current; the caller moves to ErrorResponse.
        let stage = Instant::now();
        let target = load_skeleton(&request.target, &BvhOptions { scale: unit_scale })?;
        let mut source = bvh::load(&request.source, &BvhOptions::default())?;
        if source.num_frames() > config.max_frames {
            debug!(
                "truncating {} from {} to {} frames",
                request.source.display(),
                source.num_frames(),
                config.max_frames
            );
            source.truncate(config.max_frames);
        }
        timings_ms.insert("load_ms".to_string(), elapsed_ms(stage));

        tracker.transition(RequestState::Encoding);
        let stage = Instant::now();
        let contact = HeightVelocityContact::new(config.normalize.contact.clone());
        let canonical = normalize_motion(&source, &config.normalize, &contact)?;
        let source_graph = Arc::new(skeleton_to_graph(&canonical.skeleton));
        let target_graph = Arc::new(skeleton_to_graph(&target));
        let graphs = motion_to_pose_graphs(&source_graph, &canonical.poses)?;
        let source_batch = assemble_pose_batch(graphs, &representation.input, stats)?;
        let target_batch =
            assemble_skeleton_batch(iter::repeat(&target_graph).take(canonical.num_frames()))?;
        timings_ms.insert("encode_ms".to_string(), elapsed_ms(stage));

        tracker.transition(RequestState::Inferring);
        let stage = Instant::now();
        let raw = catch_unwind(AssertUnwindSafe(|| {
            self.model.infer(&source_batch, &target_batch)
        }))
        .unwrap_or_else(|panic| {
            Err(InferenceError::Backend {
                checkpoint: self.model.checkpoint().to_string(),
                reason: panic_message(panic.as_ref()),
            })
        })?;
        timings_ms.insert("infer_ms".to_string(), elapsed_ms(stage));

        tracker.transition(RequestState::Decoding);
        let stage = Instant::now();
        let frames = decode_output(&raw, &target_batch, &representation.output, stats)?;
        let mut output = assemble_motion(&frames, &target, canonical.frame_time)?;
        let recon = gt_recon(&source_batch, stats)?;
        let mut source_reconstruction =
            assemble_motion(&recon, &canonical.skeleton, canonical.frame_time)?;
        let recon = gt_recon(&target_batch, stats)?;
        let mut target_reconstruction = assemble_motion(&recon, &target, canonical.frame_time)?;
        if unit_scale != 1.0 {
            output.scale(unit_scale.recip());
            source_reconstruction.scale(unit_scale.recip());
            target_reconstruction.scale(unit_scale.recip());
        }
        timings_ms.insert("decode_ms".to_string(), elapsed_ms(stage));

        Ok(RetargetOutcome {
            output,
            source_reconstruction,
            target_reconstruction,
        })
    }
}

fn elapsed_ms(since: Instant) -> f32 {
    since.elapsed().as_secs_f32() * 1000.0
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "motion".to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let payload = catch_unwind(|| -> u8 { panic!("boom") }).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload = catch_unwind(|| -> u8 { panic!("{} {}", "out of", "memory") }).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "panicked: out of memory");
    }

    #[test]
    fn stems_fall_back_for_bare_paths() {
        assert_eq!(stem(Path::new("/data/walk_80.bvh")), "walk_80");
        assert_eq!(stem(Path::new("/")), "motion");
    }
}
