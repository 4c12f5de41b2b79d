//! Registration-time consistency check.
//!
//! While a member registers, the kiosk takes several scans and confirms they
//! all show the same person before handing them to the enrollment-validation
//! service. This never authorizes a check-in and runs no liveness logic.

use thiserror::Error;

use crate::descriptor::{cosine_similarity, validate_descriptor, DescriptorError, DESCRIPTOR_LEN};

/// Scans submitted to the enrollment-validation service. The service
/// contract takes exactly this many.
pub const ENROLLMENT_SCANS: usize = 3;

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    /// Minimum cosine similarity against every earlier scan of the session.
    pub similarity_threshold: f32,
    pub descriptor_len: usize,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.65,
            descriptor_len: DESCRIPTOR_LEN,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("invalid scan: {0}")]
    InvalidScan(#[from] DescriptorError),
    #[error("scan does not match earlier scans (similarity {similarity:.2}, required {threshold:.2})")]
    Inconsistent { similarity: f32, threshold: f32 },
    #[error("enrollment already has {0} scans")]
    Full(usize),
    #[error("enrollment needs {required} scans, have {have}")]
    Incomplete { required: usize, have: usize },
}

/// Scans collected for one registration.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentSession {
    config: EnrollmentConfig,
    scans: Vec<Vec<f32>>,
}

impl EnrollmentSession {
    pub fn new(config: EnrollmentConfig) -> Self {
        Self {
            scans: Vec::with_capacity(ENROLLMENT_SCANS),
            config,
        }
    }

    pub fn scans(&self) -> &[Vec<f32>] {
        &self.scans
    }

    pub fn is_complete(&self) -> bool {
        self.scans.len() >= ENROLLMENT_SCANS
    }

    /// Accept `descriptor` if it is valid and consistent with every earlier
    /// scan. The first valid scan is always accepted. Returns the lowest
    /// similarity against earlier scans (1.0 for the first).
    pub fn add_scan(&mut self, descriptor: &[f32]) -> Result<f32, EnrollmentError> {
        if self.is_complete() {
            return Err(EnrollmentError::Full(self.scans.len()));
        }
        validate_descriptor(descriptor, self.config.descriptor_len)?;

        let similarity = self
            .scans
            .iter()
            .map(|prev| cosine_similarity(prev, descriptor))
            .fold(1.0f32, f32::min);
        if similarity < self.config.similarity_threshold {
            tracing::debug!(
                similarity,
                threshold = self.config.similarity_threshold,
                "enrollment: scan rejected as inconsistent"
            );
            return Err(EnrollmentError::Inconsistent {
                similarity,
                threshold: self.config.similarity_threshold,
            });
        }

        self.scans.push(descriptor.to_vec());
        tracing::debug!(
            scans = self.scans.len(),
            required = ENROLLMENT_SCANS,
            similarity,
            "enrollment: scan accepted"
        );
        Ok(similarity)
    }

    /// Hand the collected scans over for remote validation.
    pub fn into_scans(self) -> Result<Vec<Vec<f32>>, EnrollmentError> {
        if !self.is_complete() {
            return Err(EnrollmentError::Incomplete {
                required: ENROLLMENT_SCANS,
                have: self.scans.len(),
            });
        }
        Ok(self.scans)
    }
}
