//! Active liveness detection from a stream of 68-point landmark sets.
//!
//! A printed photo or a looped replay held in front of the camera keeps the
//! eye contour open and the head rigid. A live person blinks and moves. The
//! [`LivenessAccumulator`] is fed one landmark set per detected frame and
//! keeps running counters of four signals:
//!
//! - **Blinks**: mean eye aspect ratio crossing below the closed-eye threshold.
//! - **Head movements**: scale-normalized displacement of six key landmarks
//!   between consecutive frames.
//! - **Mouth movements**: mouth aspect ratio above the open-mouth threshold.
//! - **Face size variations**: face area deviating from the recent mean,
//!   i.e. the subject moving toward or away from the camera.
//!
//! Blinks and head movements are hard gates for [`LivenessReport::is_live`].
//! Mouth and size signals only contribute to the score; they help still users
//! reach the score floor without being required.

use std::collections::VecDeque;

use serde::Serialize;

use crate::geometry::{distance, face_area, face_width, mean_eye_aspect_ratio, mouth_aspect_ratio};
use crate::landmarks::{as_full_set, centroid, index, Point};

/// Tunables for the accumulator. `Default` carries the production values.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Blinks required for the blink hard gate.
    pub min_blinks: u32,
    /// Head movements required for the head-movement hard gate.
    pub min_head_movements: u32,
    /// Mean EAR below which the eyes count as closed.
    pub ear_threshold: f32,
    /// Dips closer together than this count as one blink.
    pub blink_debounce_ms: u64,
    /// Mean key-landmark displacement, as a fraction of face width, that
    /// counts as a head movement.
    pub head_movement_threshold: f32,
    /// MAR above which the mouth counts as open.
    pub mar_threshold: f32,
    /// Relative deviation from the recent mean area that counts as a size change.
    pub size_variation_threshold: f32,
    /// Number of preceding frames whose mean area is the size baseline.
    pub size_window: usize,
    /// Capacity of the landmark history ring buffer.
    pub history_len: usize,
    /// Minimum fused score for `is_live`.
    pub min_live_score: f32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            min_blinks: 1,
            min_head_movements: 2,
            ear_threshold: 0.25,
            blink_debounce_ms: 200,
            head_movement_threshold: 0.02,
            mar_threshold: 0.35,
            size_variation_threshold: 0.05,
            size_window: 5,
            history_len: 30,
            min_live_score: 60.0,
        }
    }
}

/// Raw signal counters, as shown in progress displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LivenessChecks {
    pub blinks: u32,
    pub head_movements: u32,
    pub mouth_movements: u32,
    pub face_size_variations: u32,
}

/// Outcome of one accumulator update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivenessReport {
    pub is_live: bool,
    /// Fused score in `0.0..=100.0`.
    pub score: f32,
    pub checks: LivenessChecks,
}

/// Key landmarks and area of one buffered frame.
#[derive(Debug, Clone, Copy)]
struct FrameSample {
    /// Nose tip, chin, both jaw boundaries, both eye centres.
    key_points: [Point; 6],
    area: f32,
}

/// Evidence gathered over one continuous face presentation.
#[derive(Debug, Clone, Default)]
pub struct LivenessEvidence {
    pub checks: LivenessChecks,
    pub last_ear: Option<f32>,
    pub last_blink_ms: Option<u64>,
    history: VecDeque<FrameSample>,
}

impl LivenessEvidence {
    /// Number of frames currently held in the ring buffer.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Incremental liveness state machine. One instance per verification session.
#[derive(Debug, Clone)]
pub struct LivenessAccumulator {
    config: LivenessConfig,
    evidence: LivenessEvidence,
}

impl LivenessAccumulator {
    pub fn new(config: LivenessConfig) -> Self {
        let evidence = LivenessEvidence {
            history: VecDeque::with_capacity(config.history_len),
            ..LivenessEvidence::default()
        };
        Self { config, evidence }
    }

    pub fn evidence(&self) -> &LivenessEvidence {
        &self.evidence
    }

    pub fn checks(&self) -> LivenessChecks {
        self.evidence.checks
    }

    /// Fold one frame's landmarks into the evidence and report the result.
    ///
    /// An unusable landmark set (short, non-finite) leaves every counter
    /// untouched and reports `is_live = false` with a zero score.
    pub fn update(&mut self, landmarks: &[Point], timestamp_ms: u64) -> LivenessReport {
        let Some(set) = as_full_set(landmarks) else {
            tracing::debug!(points = landmarks.len(), "liveness: unusable landmark set");
            return LivenessReport {
                is_live: false,
                score: 0.0,
                checks: self.evidence.checks,
            };
        };

        self.track_blink(set, timestamp_ms);

        let sample = sample_frame(set);
        if let Some(sample) = sample {
            self.track_head_movement(set, &sample);
            self.track_size_variation(&sample);
        }

        if mouth_aspect_ratio(set).is_some_and(|mar| mar > self.config.mar_threshold) {
            self.evidence.checks.mouth_movements += 1;
        }

        if let Some(sample) = sample {
            if self.evidence.history.len() == self.config.history_len {
                self.evidence.history.pop_front();
            }
            self.evidence.history.push_back(sample);
        }

        self.report()
    }

    /// Score and gate decision for the evidence gathered so far.
    pub fn report(&self) -> LivenessReport {
        let checks = self.evidence.checks;
        let score = self.score(&checks);
        let is_live = checks.blinks >= self.config.min_blinks
            && checks.head_movements >= self.config.min_head_movements
            && score >= self.config.min_live_score;
        LivenessReport {
            is_live,
            score,
            checks,
        }
    }

    /// Zero every counter and forget all history.
    pub fn reset(&mut self) {
        self.evidence.checks = LivenessChecks::default();
        self.evidence.last_ear = None;
        self.evidence.last_blink_ms = None;
        self.evidence.history.clear();
    }

    fn score(&self, checks: &LivenessChecks) -> f32 {
        let blink_part = progress_ratio(checks.blinks, self.config.min_blinks) * 30.0;
        let head_part =
            progress_ratio(checks.head_movements, self.config.min_head_movements) * 30.0;
        let mouth_part = if checks.mouth_movements > 0 { 20.0 } else { 0.0 };
        let size_part = if checks.face_size_variations > 0 { 20.0 } else { 0.0 };
        blink_part + head_part + mouth_part + size_part
    }

    fn track_blink(&mut self, set: &[Point], timestamp_ms: u64) {
        let Some(ear) = mean_eye_aspect_ratio(set) else {
            return;
        };
        let threshold = self.config.ear_threshold;
        let closed_now = self
            .evidence
            .last_ear
            .is_some_and(|prev| prev >= threshold && ear < threshold);

        if closed_now {
            let debounced = self
                .evidence
                .last_blink_ms
                .is_some_and(|t| timestamp_ms.saturating_sub(t) < self.config.blink_debounce_ms);
            if !debounced {
                self.evidence.checks.blinks += 1;
                self.evidence.last_blink_ms = Some(timestamp_ms);
                tracing::debug!(ear, blinks = self.evidence.checks.blinks, "liveness: blink");
            }
        }
        self.evidence.last_ear = Some(ear);
    }

    fn track_head_movement(&mut self, set: &[Point], sample: &FrameSample) {
        let Some(prev) = self.evidence.history.back() else {
            return;
        };
        let width = face_width(set).unwrap_or(0.0);
        if width <= 0.0 {
            return;
        }
        let total: f32 = sample
            .key_points
            .iter()
            .zip(prev.key_points.iter())
            .map(|(cur, prev)| distance(*cur, *prev) / width)
            .sum();
        let movement = total / sample.key_points.len() as f32;

        if movement > self.config.head_movement_threshold {
            self.evidence.checks.head_movements += 1;
            tracing::debug!(
                movement,
                head_movements = self.evidence.checks.head_movements,
                "liveness: head movement"
            );
        }
    }

    fn track_size_variation(&mut self, sample: &FrameSample) {
        let window = self.config.size_window;
        if window == 0 || self.evidence.history.len() < window {
            return;
        }
        let baseline: f32 = self
            .evidence
            .history
            .iter()
            .rev()
            .take(window)
            .map(|s| s.area)
            .sum::<f32>()
            / window as f32;
        if baseline <= 0.0 {
            return;
        }
        let deviation = (sample.area - baseline).abs() / baseline;
        if deviation > self.config.size_variation_threshold {
            self.evidence.checks.face_size_variations += 1;
        }
    }
}

impl Default for LivenessAccumulator {
    fn default() -> Self {
        Self::new(LivenessConfig::default())
    }
}

fn progress_ratio(count: u32, required: u32) -> f32 {
    if required == 0 {
        return 1.0;
    }
    (count as f32 / required as f32).min(1.0)
}

fn sample_frame(set: &[Point]) -> Option<FrameSample> {
    let right_eye = centroid(&set[index::RIGHT_EYE])?;
    let left_eye = centroid(&set[index::LEFT_EYE])?;
    Some(FrameSample {
        key_points: [
            set[index::NOSE_TIP],
            set[index::CHIN],
            set[index::JAW_LEFT],
            set[index::JAW_RIGHT],
            right_eye,
            left_eye,
        ],
        area: face_area(set)?,
    })
}
