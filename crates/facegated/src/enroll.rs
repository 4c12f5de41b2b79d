//! `facegated enroll`: collect consistent scans and submit them for validation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use facegate_core::{
    EnrollmentConfig, EnrollmentError, EnrollmentSession, EnrollmentValidator, EnrollmentVerdict,
    MatcherError, ENROLLMENT_SCANS,
};
use tokio::io::{AsyncBufRead, Lines};
use tokio::time::Instant;

use crate::frames::{next_detection, Detection};

pub struct EnrollOptions {
    pub config: EnrollmentConfig,
    pub min_confidence: f32,
    /// Minimum spacing between accepted scans, so the scans are not
    /// consecutive copies of one frame.
    pub scan_interval: Duration,
    pub timeout: Duration,
}

/// Collect scans from `lines` until the session is complete, then ask the
/// validator to confirm them.
pub async fn run_enroll<R, V>(
    lines: &mut Lines<R>,
    options: &EnrollOptions,
    validator: Arc<V>,
) -> Result<EnrollmentVerdict>
where
    R: AsyncBufRead + Unpin,
    V: EnrollmentValidator,
{
    let mut session = EnrollmentSession::new(options.config.clone());
    let mut last_accepted: Option<Instant> = None;

    while !session.is_complete() {
        let Some(detection) = next_detection(lines, options.min_confidence)
            .await
            .context("reading detector output")?
        else {
            bail!(
                "input ended after {} of {} scans",
                session.scans().len(),
                ENROLLMENT_SCANS
            );
        };
        let Detection::Face { descriptor, .. } = detection else {
            continue;
        };
        if last_accepted.is_some_and(|t| t.elapsed() < options.scan_interval) {
            continue;
        }

        match session.add_scan(&descriptor) {
            Ok(similarity) => {
                last_accepted = Some(Instant::now());
                tracing::info!(
                    scan = session.scans().len(),
                    required = ENROLLMENT_SCANS,
                    similarity,
                    "enrollment scan captured"
                );
            }
            Err(e @ (EnrollmentError::Inconsistent { .. } | EnrollmentError::InvalidScan(_))) => {
                tracing::warn!(error = %e, "enrollment scan discarded");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let scans = session.into_scans()?;
    tracing::info!(scans = scans.len(), "submitting enrollment for validation");

    let timeout_ms = options.timeout.as_millis() as u64;
    let call = tokio::task::spawn_blocking(move || validator.validate(&scans));
    let verdict = match tokio::time::timeout(options.timeout, call).await {
        Ok(joined) => joined.context("validator task failed")?,
        Err(_) => Err(MatcherError::Timeout(timeout_ms)),
    }?;

    if verdict.is_accepted() {
        tracing::info!("enrollment accepted");
    } else {
        tracing::warn!(message = ?verdict.message, "enrollment rejected");
    }
    Ok(verdict)
}
