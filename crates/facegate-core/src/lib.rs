//! Face check-in gatekeeper: decides whether a live person matching an
//! enrolled member is in front of the camera.
//!
//! Data flows leaf to root:
//!
//! - [`geometry`]: EAR, MAR, distance and face area over landmark points.
//! - [`liveness`]: per-frame accumulation of blink, head, mouth and size
//!   signals into a fused liveness score.
//! - [`descriptor`]: same-face detection between consecutive descriptors,
//!   cosine similarity, local descriptor validation.
//! - [`gate`]: the verification state machine that gates, debounces and
//!   applies calls to the remote identity matcher.
//!
//! [`enrollment`] covers the registration-time consistency check.

pub mod descriptor;
pub mod enrollment;
pub mod error;
pub mod gate;
pub mod geometry;
pub mod landmarks;
pub mod liveness;
pub mod matcher;

#[cfg(test)]
mod testing;

pub use descriptor::{cosine_similarity, same_face, DescriptorChangeDetector, FaceChange};
pub use enrollment::{EnrollmentConfig, EnrollmentError, EnrollmentSession, ENROLLMENT_SCANS};
pub use error::{GateFault, Severity};
pub use gate::{
    FrameObservation, GateConfig, GateState, GateStatus, MatchRequest, Progress,
    VerificationGate,
};
pub use landmarks::{Point, RawLandmarks};
pub use liveness::{LivenessAccumulator, LivenessChecks, LivenessConfig, LivenessReport};
pub use matcher::{
    EnrollmentValidator, EnrollmentVerdict, IdentityMatcher, MatchResponse, MatcherError,
};
