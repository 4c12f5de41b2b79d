//! Contracts for the remote collaborators the gate depends on.
//!
//! Both collaborators are modeled as blocking calls. The driver runs them off
//! the gate's control flow and bounds them with a timeout; the gate only sees
//! the classified outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response body of the identity-match endpoint.
///
/// Every field is optional so a partial body still deserializes; the gate
/// decides what a partial body means (it is never a match).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub is_match: Option<bool>,
    #[serde(default)]
    pub similarity: Option<f32>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl MatchResponse {
    /// Exactly `success == true && isMatch == true`. Anything else is a non-match.
    pub fn is_confirmed_match(&self) -> bool {
        self.success == Some(true) && self.is_match == Some(true)
    }
}

/// Response body of the enrollment-validation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentVerdict {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EnrollmentVerdict {
    pub fn is_accepted(&self) -> bool {
        self.success == Some(true) && self.is_valid == Some(true)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("identity service did not answer within {0} ms")]
    Timeout(u64),
    #[error("identity service unavailable: {0}")]
    Transport(String),
    #[error("malformed response from identity service: {0}")]
    Malformed(String),
}

/// Remote 1:1 identity match against the enrolled member.
pub trait IdentityMatcher: Send + Sync + 'static {
    fn match_descriptor(&self, descriptor: &[f32]) -> Result<MatchResponse, MatcherError>;
}

/// Remote check that a set of enrollment scans is usable.
pub trait EnrollmentValidator: Send + Sync + 'static {
    fn validate(&self, descriptors: &[Vec<f32>]) -> Result<EnrollmentVerdict, MatcherError>;
}
