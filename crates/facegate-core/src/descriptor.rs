//! Identity descriptor primitives: change detection, similarity, validation.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Descriptor length produced by the 68-landmark recognition network.
pub const DESCRIPTOR_LEN: usize = 128;

/// Default mean absolute difference under which two consecutive descriptors
/// belong to the same continuing face.
pub const DEFAULT_SAME_FACE_EPSILON: f32 = 0.05;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("invalid descriptor length: {actual} (expected {expected})")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid descriptor value (NaN/Inf) at index {0}")]
    NonFinite(usize),
    #[error("descriptor is all zeros")]
    AllZero,
}

/// Reject anything that must never leave the device: wrong length,
/// non-finite values, or an all-zero vector.
pub fn validate_descriptor(values: &[f32], expected_len: usize) -> Result<(), DescriptorError> {
    if values.len() != expected_len {
        return Err(DescriptorError::InvalidLength {
            expected: expected_len,
            actual: values.len(),
        });
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(DescriptorError::NonFinite(i));
    }
    if values.iter().all(|v| *v == 0.0) {
        return Err(DescriptorError::AllZero);
    }
    Ok(())
}

/// Whether `current` is the same continuing face as `previous`: equal length
/// and mean absolute per-element difference at most `epsilon`.
pub fn same_face(previous: &[f32], current: &[f32], epsilon: f32) -> bool {
    if previous.len() != current.len() {
        return false;
    }
    if previous.is_empty() {
        return true;
    }
    let total: f32 = previous
        .iter()
        .zip(current)
        .map(|(a, b)| (a - b).abs())
        .sum();
    let mean = total / previous.len() as f32;
    // NaN compares false, so a poisoned descriptor never counts as the same face
    mean <= epsilon
}

/// `dot(a, b) / (|a| * |b|)`; zero when lengths differ or either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Short hex fingerprint of a descriptor, for log correlation without
/// writing biometric data to the log.
pub fn fingerprint(values: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        hasher.update(v.to_le_bytes());
    }
    let digest = hasher.finalize();
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

/// Outcome of feeding a descriptor to a [`DescriptorChangeDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceChange {
    /// First observation, or a descriptor that moved past the epsilon.
    New,
    /// Same continuing face as the previous observation.
    Same,
}

/// Tracks the previous descriptor and classifies each new one.
#[derive(Debug, Clone)]
pub struct DescriptorChangeDetector {
    epsilon: f32,
    previous: Option<Vec<f32>>,
}

impl DescriptorChangeDetector {
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon,
            previous: None,
        }
    }

    /// Compare `current` with the previous observation and remember it.
    pub fn observe(&mut self, current: &[f32]) -> FaceChange {
        let change = match &self.previous {
            Some(prev) if same_face(prev, current, self.epsilon) => FaceChange::Same,
            _ => FaceChange::New,
        };
        match &mut self.previous {
            Some(prev) => {
                prev.clear();
                prev.extend_from_slice(current);
            }
            None => self.previous = Some(current.to_vec()),
        }
        change
    }

    /// Forget the previous observation; the next one is always [`FaceChange::New`].
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl Default for DescriptorChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SAME_FACE_EPSILON)
    }
}
