use thiserror::Error;

use crate::descriptor::DescriptorError;

/// Why a verification attempt did not end in `Verified`.
///
/// Transient detection loss is deliberately absent: losing the face resets
/// the gate silently and is never surfaced as a fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateFault {
    /// Descriptor failed local validation; nothing was sent.
    #[error("invalid face data: {0}")]
    Input(#[from] DescriptorError),
    /// The identity service exceeded its time budget.
    #[error("verification timed out after {0} ms")]
    Timeout(u64),
    /// The identity service answered, but not with a confirmed match.
    #[error("{}", describe_rejection(.similarity, .threshold))]
    Rejected {
        similarity: Option<f32>,
        threshold: Option<f32>,
        message: Option<String>,
    },
    /// The identity service could not be reached.
    #[error("verification service unavailable: {0}")]
    Unavailable(String),
}

/// How the UI should present a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Info,
    Retry,
    Blocking,
}

impl GateFault {
    pub fn severity(&self) -> Severity {
        match self {
            GateFault::Rejected { .. } => Severity::Retry,
            GateFault::Input(_) | GateFault::Timeout(_) | GateFault::Unavailable(_) => {
                Severity::Blocking
            }
        }
    }
}

fn describe_rejection(similarity: &Option<f32>, threshold: &Option<f32>) -> String {
    match (similarity, threshold) {
        (Some(s), Some(t)) => format!(
            "face not recognized (similarity {:.0}%, required {:.0}%); keep your face in view to try again",
            s * 100.0,
            t * 100.0
        ),
        (Some(s), None) => format!(
            "face not recognized (similarity {:.0}%); keep your face in view to try again",
            s * 100.0
        ),
        _ => "face not recognized; keep your face in view to try again".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_surfaces_similarity_and_threshold() {
        let fault = GateFault::Rejected {
            similarity: Some(0.40),
            threshold: Some(0.95),
            message: None,
        };
        let text = fault.to_string();
        assert!(text.contains("40%"), "{text}");
        assert!(text.contains("95%"), "{text}");
        assert_eq!(fault.severity(), Severity::Retry);
    }

    #[test]
    fn test_input_and_timeout_block() {
        assert_eq!(
            GateFault::Input(DescriptorError::AllZero).severity(),
            Severity::Blocking
        );
        assert_eq!(GateFault::Timeout(10_000).severity(), Severity::Blocking);
    }
}
