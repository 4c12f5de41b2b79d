//! The check-in verification gate.
//!
//! [`VerificationGate`] is a synchronous, clock-injected state machine. The
//! caller feeds it one [`FrameObservation`] (or a face-loss notice) per
//! detection tick, calls [`VerificationGate::poll`] whenever
//! [`VerificationGate::next_deadline`] passes, forwards any returned
//! [`MatchRequest`] to the identity service, and hands the outcome back via
//! [`VerificationGate::apply_match`].
//!
//! ```text
//! Idle ──face──▶ Detecting ──gates pass──▶ Verifying ──match──▶ Verified
//!   ▲               │  ▲                      │ ├─no match──▶ Rejected
//!   │               │  └── progress message   │ └─timeout/io─▶ Error
//!   └─ face lost ◀──┴──── face changed (any state, synchronous) ◀┘
//! ```
//!
//! Invariants held by construction:
//!
//! - `Verified` is only entered from [`VerificationGate::apply_match`] with a
//!   confirmed match for the in-flight attempt of the current session, and
//!   the in-flight descriptor is still the same face as the current one.
//!   It is left as soon as a frame's descriptor is no longer the same face
//!   as the verified one, even if each step from frame to frame was small.
//! - A descriptor with non-finite values fails closed to `Error` and never
//!   reaches the change detector.
//! - `Rejected` and `Error` hold for `retry_after_ms`, then the same face
//!   gets a fresh evidence window and continuity period.
//! - A face change or face loss drops the session, the liveness evidence, the
//!   pending debounce and the in-flight attempt in one step, before the new
//!   frame's evidence is accumulated.
//! - At most one debounce deadline and one in-flight attempt exist.
//! - The debounce check reads the accumulator's live counters when it fires.

use serde::Serialize;
use uuid::Uuid;

use crate::descriptor::{
    fingerprint, same_face, validate_descriptor, DescriptorChangeDetector, DescriptorError,
    FaceChange, DEFAULT_SAME_FACE_EPSILON, DESCRIPTOR_LEN,
};
use crate::error::{GateFault, Severity};
use crate::landmarks::Point;
use crate::liveness::{LivenessAccumulator, LivenessChecks, LivenessConfig};
use crate::matcher::{MatchResponse, MatcherError};

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub liveness: LivenessConfig,
    pub same_face_epsilon: f32,
    pub descriptor_len: usize,
    /// Continuous detection required before a remote call.
    pub min_continuous_ms: u64,
    /// Quiet period after the last frame before the gate check runs.
    pub debounce_ms: u64,
    /// Upper bound on how long a steady frame stream can postpone the check.
    pub debounce_max_wait_ms: u64,
    /// Budget for one identity-service call.
    pub match_timeout_ms: u64,
    /// How long `Rejected` or `Error` stays on screen before the same face
    /// may start another attempt.
    pub retry_after_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            same_face_epsilon: DEFAULT_SAME_FACE_EPSILON,
            descriptor_len: DESCRIPTOR_LEN,
            min_continuous_ms: 3000,
            debounce_ms: 300,
            debounce_max_wait_ms: 600,
            match_timeout_ms: 10_000,
            retry_after_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Idle,
    Detecting,
    Verifying,
    Verified,
    Rejected,
    Error,
}

/// One detection tick's worth of face data, already normalized.
#[derive(Debug, Clone)]
pub struct FrameObservation {
    pub landmarks: Vec<Point>,
    pub descriptor: Vec<f32>,
    pub timestamp_ms: u64,
}

/// A descriptor cleared for the identity service.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub attempt: u64,
    pub descriptor: Vec<f32>,
}

/// Counters for progress display, e.g. "blinks 0/1, head-moves 1/2, 1.8s/3.0s".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub blinks: u32,
    pub min_blinks: u32,
    pub head_movements: u32,
    pub min_head_movements: u32,
    pub mouth_movements: u32,
    pub face_size_variations: u32,
    pub score: f32,
    pub detection_ms: u64,
    pub required_ms: u64,
}

impl Progress {
    pub fn summary(&self) -> String {
        format!(
            "blinks {}/{}, head-moves {}/{}, {:.1}s/{:.1}s",
            self.blinks,
            self.min_blinks,
            self.head_movements,
            self.min_head_movements,
            self.detection_ms as f64 / 1000.0,
            self.required_ms as f64 / 1000.0,
        )
    }
}

/// What the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateStatus {
    pub state: GateState,
    pub message: String,
    pub severity: Severity,
    pub progress: Progress,
    pub similarity: Option<f32>,
    pub threshold: Option<f32>,
}

/// One continuous presentation of one face.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: Uuid,
    pub state: GateState,
    pub current_descriptor: Vec<f32>,
    pub started_ms: u64,
    pub continuous_ms: u64,
    pub last_frame_ms: u64,
    /// When the last attempt ended in `Rejected` or `Error`.
    pub settled_ms: Option<u64>,
    pub last_verified_descriptor: Option<Vec<f32>>,
    pub last_error: Option<GateFault>,
    pub message: String,
    pub similarity: Option<f32>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Debounce {
    first_scheduled_ms: u64,
    deadline_ms: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    attempt: u64,
    session_id: Uuid,
    descriptor: Vec<f32>,
    deadline_ms: u64,
}

/// The only ways a live session's state may change.
enum Transition {
    Progress(String),
    Retry {
        now_ms: u64,
    },
    Verifying,
    Verified {
        descriptor: Vec<f32>,
        response: MatchResponse,
    },
    Failed(GateFault),
}

pub struct VerificationGate {
    config: GateConfig,
    detector: DescriptorChangeDetector,
    liveness: LivenessAccumulator,
    session: Option<VerificationSession>,
    debounce: Option<Debounce>,
    in_flight: Option<InFlight>,
    next_attempt: u64,
}

impl VerificationGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            detector: DescriptorChangeDetector::new(config.same_face_epsilon),
            liveness: LivenessAccumulator::new(config.liveness.clone()),
            session: None,
            debounce: None,
            in_flight: None,
            next_attempt: 1,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.session.as_ref()
    }

    pub fn liveness(&self) -> &LivenessAccumulator {
        &self.liveness
    }

    pub fn state(&self) -> GateState {
        self.session.as_ref().map_or(GateState::Idle, |s| s.state)
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let debounce = self.debounce.map(|d| d.deadline_ms);
        let flight = self.in_flight.as_ref().map(|f| f.deadline_ms);
        match (debounce, flight) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Feed one detected face.
    pub fn on_frame(&mut self, obs: &FrameObservation) {
        if let Some(i) = obs.descriptor.iter().position(|v| !v.is_finite()) {
            self.reject_frame(obs, DescriptorError::NonFinite(i));
            return;
        }

        let changed = self.detector.observe(&obs.descriptor) == FaceChange::New;
        if changed || self.drifted_from_verified(&obs.descriptor) {
            self.begin_session(obs);
        } else if self.retry_due(obs.timestamp_ms) {
            self.rearm(obs.timestamp_ms);
        }
        self.liveness.update(&obs.landmarks, obs.timestamp_ms);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.current_descriptor.clone_from(&obs.descriptor);
        session.last_frame_ms = obs.timestamp_ms;
        session.continuous_ms = obs.timestamp_ms.saturating_sub(session.started_ms);

        if session.state == GateState::Detecting && self.in_flight.is_none() {
            self.schedule_debounce(obs.timestamp_ms);
        }
    }

    /// No face this tick. Silent: a lost face is not an error.
    pub fn on_face_lost(&mut self, now_ms: u64) {
        if self.session.is_none() {
            return;
        }
        tracing::debug!(now_ms, "face lost; resetting gate");
        self.detector.reset();
        self.reset_session();
    }

    /// Advance timers. Returns a request when the debounce fires, the gates
    /// pass, and the descriptor validates.
    pub fn poll(&mut self, now_ms: u64) -> Option<MatchRequest> {
        if let Some(flight) = &self.in_flight {
            if now_ms >= flight.deadline_ms {
                let attempt = flight.attempt;
                self.in_flight = None;
                tracing::warn!(attempt, "identity match timed out");
                self.transition(Transition::Failed(GateFault::Timeout(
                    self.config.match_timeout_ms,
                )));
            }
        }

        let debounce = self.debounce?;
        if now_ms < debounce.deadline_ms {
            return None;
        }
        self.debounce = None;
        self.fire(now_ms)
    }

    /// Apply the identity service's answer for `attempt`.
    ///
    /// Answers for anything other than the current in-flight attempt are
    /// dropped. An answer whose descriptor no longer matches the live face
    /// forces a full reset instead of being applied.
    pub fn apply_match(&mut self, attempt: u64, outcome: Result<MatchResponse, MatcherError>) {
        let flight = match self.in_flight.take() {
            Some(flight) if flight.attempt == attempt => flight,
            other => {
                self.in_flight = other;
                tracing::warn!(attempt, "discarding stale identity match response");
                return;
            }
        };

        let fresh = self.session.as_ref().is_some_and(|s| {
            s.id == flight.session_id
                && same_face(
                    &flight.descriptor,
                    &s.current_descriptor,
                    self.config.same_face_epsilon,
                )
        });
        if !fresh {
            tracing::warn!(attempt, "face changed while match was in flight; resetting");
            self.detector.reset();
            self.reset_session();
            return;
        }

        let transition = match outcome {
            Ok(response) if response.is_confirmed_match() => Transition::Verified {
                descriptor: flight.descriptor,
                response,
            },
            Ok(response) => Transition::Failed(GateFault::Rejected {
                similarity: response.similarity,
                threshold: response.threshold,
                message: response.message,
            }),
            Err(MatcherError::Malformed(detail)) => Transition::Failed(GateFault::Rejected {
                similarity: None,
                threshold: None,
                message: Some(detail),
            }),
            Err(MatcherError::Timeout(ms)) => Transition::Failed(GateFault::Timeout(ms)),
            Err(MatcherError::Transport(detail)) => {
                Transition::Failed(GateFault::Unavailable(detail))
            }
        };
        self.transition(transition);
    }

    pub fn status(&self) -> GateStatus {
        let progress = self.progress();
        match &self.session {
            None => GateStatus {
                state: GateState::Idle,
                message: "Look at the camera to check in".to_string(),
                severity: Severity::None,
                progress,
                similarity: None,
                threshold: None,
            },
            Some(s) => GateStatus {
                state: s.state,
                message: s.message.clone(),
                severity: match (&s.state, &s.last_error) {
                    (GateState::Detecting | GateState::Verifying, _) => Severity::Info,
                    (_, Some(fault)) => fault.severity(),
                    _ => Severity::None,
                },
                progress,
                similarity: s.similarity,
                threshold: s.threshold,
            },
        }
    }

    fn progress(&self) -> Progress {
        let LivenessChecks {
            blinks,
            head_movements,
            mouth_movements,
            face_size_variations,
        } = self.liveness.checks();
        Progress {
            blinks,
            min_blinks: self.config.liveness.min_blinks,
            head_movements,
            min_head_movements: self.config.liveness.min_head_movements,
            mouth_movements,
            face_size_variations,
            score: self.liveness.report().score,
            detection_ms: self.session.as_ref().map_or(0, |s| s.continuous_ms),
            required_ms: self.config.min_continuous_ms,
        }
    }

    fn begin_session(&mut self, obs: &FrameObservation) {
        if let Some(old) = &self.session {
            tracing::info!(
                session = %old.id,
                state = ?old.state,
                "face changed; discarding session"
            );
        }
        self.reset_session();

        let session = VerificationSession {
            id: Uuid::new_v4(),
            state: GateState::Detecting,
            current_descriptor: obs.descriptor.clone(),
            started_ms: obs.timestamp_ms,
            continuous_ms: 0,
            last_frame_ms: obs.timestamp_ms,
            settled_ms: None,
            last_verified_descriptor: None,
            last_error: None,
            message: "Hold still and blink naturally".to_string(),
            similarity: None,
            threshold: None,
        };
        tracing::info!(
            session = %session.id,
            descriptor = %fingerprint(&obs.descriptor),
            "face detected; session started"
        );
        self.session = Some(session);
    }

    /// A frame whose descriptor can never be sent. Fails closed without
    /// touching the change detector, so bad frames do not cycle sessions.
    fn reject_frame(&mut self, obs: &FrameObservation, err: DescriptorError) {
        if self.session.is_none() {
            self.begin_session(obs);
        }
        self.debounce = None;
        self.in_flight = None;
        if let Some(session) = self.session.as_mut() {
            session.last_frame_ms = obs.timestamp_ms;
        }
        if self.state() != GateState::Error {
            tracing::warn!(error = %err, "descriptor rejected locally");
        }
        self.transition(Transition::Failed(GateFault::Input(err)));
    }

    fn drifted_from_verified(&self, descriptor: &[f32]) -> bool {
        let drifted = self
            .session
            .as_ref()
            .and_then(|s| s.last_verified_descriptor.as_deref())
            .is_some_and(|verified| {
                !same_face(verified, descriptor, self.config.same_face_epsilon)
            });
        if drifted {
            tracing::info!(
                descriptor = %fingerprint(descriptor),
                "descriptor drifted away from the verified face"
            );
        }
        drifted
    }

    fn retry_due(&self, now_ms: u64) -> bool {
        self.session.as_ref().is_some_and(|s| {
            matches!(s.state, GateState::Rejected | GateState::Error)
                && s.settled_ms
                    .is_some_and(|t| now_ms.saturating_sub(t) >= self.config.retry_after_ms)
        })
    }

    /// Give the same face another attempt, starting from zero evidence.
    fn rearm(&mut self, now_ms: u64) {
        self.liveness.reset();
        self.debounce = None;
        self.transition(Transition::Retry { now_ms });
    }

    /// Drop everything tied to the current face in one step.
    fn reset_session(&mut self) {
        self.session = None;
        self.liveness.reset();
        self.debounce = None;
        self.in_flight = None;
    }

    fn schedule_debounce(&mut self, now_ms: u64) {
        let first = self.debounce.map_or(now_ms, |d| d.first_scheduled_ms);
        let max_wait = self.config.debounce_max_wait_ms.max(self.config.debounce_ms);
        let deadline = (now_ms + self.config.debounce_ms).min(first + max_wait);
        self.debounce = Some(Debounce {
            first_scheduled_ms: first,
            deadline_ms: deadline,
        });
    }

    fn fire(&mut self, now_ms: u64) -> Option<MatchRequest> {
        let session = self.session.as_ref()?;
        if session.state != GateState::Detecting || self.in_flight.is_some() {
            return None;
        }

        let checks = self.liveness.checks();
        let liveness = &self.config.liveness;
        let time_ok = session.continuous_ms >= self.config.min_continuous_ms;
        let evidence_ok = checks.blinks >= liveness.min_blinks
            || checks.head_movements >= liveness.min_head_movements;

        if !(time_ok && evidence_ok) {
            let message = self.progress_message(session.continuous_ms, &checks);
            tracing::debug!(
                session = %session.id,
                summary = %self.progress().summary(),
                "liveness gates not met"
            );
            self.transition(Transition::Progress(message));
            return None;
        }

        if let Err(e) = validate_descriptor(&session.current_descriptor, self.config.descriptor_len)
        {
            tracing::warn!(session = %session.id, error = %e, "descriptor rejected locally");
            self.transition(Transition::Failed(GateFault::Input(e)));
            return None;
        }

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        let descriptor = session.current_descriptor.clone();
        tracing::info!(
            session = %session.id,
            attempt,
            descriptor = %fingerprint(&descriptor),
            score = self.liveness.report().score,
            "liveness gates passed; requesting identity match"
        );
        self.in_flight = Some(InFlight {
            attempt,
            session_id: session.id,
            descriptor: descriptor.clone(),
            deadline_ms: now_ms + self.config.match_timeout_ms,
        });
        self.transition(Transition::Verifying);
        Some(MatchRequest {
            attempt,
            descriptor,
        })
    }

    fn progress_message(&self, continuous_ms: u64, checks: &LivenessChecks) -> String {
        let liveness = &self.config.liveness;
        let mut parts = Vec::new();
        if continuous_ms < self.config.min_continuous_ms {
            let remaining = self.config.min_continuous_ms - continuous_ms;
            parts.push(format!(
                "keep your face in view for {:.1}s more",
                remaining as f64 / 1000.0
            ));
        }
        if checks.blinks < liveness.min_blinks && checks.head_movements < liveness.min_head_movements
        {
            parts.push(format!(
                "blink {} more time(s) or turn your head {} more time(s)",
                liveness.min_blinks - checks.blinks,
                liveness.min_head_movements - checks.head_movements
            ));
        }
        let mut message = parts.join("; ");
        if let Some(first) = message.get_mut(..1) {
            first.make_ascii_uppercase();
        }
        message
    }

    /// Single writer of session state and of `last_verified_descriptor`.
    fn transition(&mut self, transition: Transition) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.state;
        match transition {
            Transition::Progress(message) => {
                session.message = message;
            }
            Transition::Retry { now_ms } => {
                session.state = GateState::Detecting;
                session.started_ms = now_ms;
                session.continuous_ms = 0;
                session.last_frame_ms = now_ms;
                session.settled_ms = None;
                session.last_error = None;
                session.similarity = None;
                session.threshold = None;
                session.message = "Try again: hold still and blink naturally".to_string();
            }
            Transition::Verifying => {
                session.state = GateState::Verifying;
                session.message = "Verifying identity...".to_string();
            }
            Transition::Verified {
                descriptor,
                response,
            } => {
                session.state = GateState::Verified;
                session.last_verified_descriptor = Some(descriptor);
                session.last_error = None;
                session.similarity = response.similarity;
                session.threshold = response.threshold;
                session.message = response
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Identity verified".to_string());
            }
            Transition::Failed(fault) => {
                session.state = match fault {
                    GateFault::Rejected { .. } => GateState::Rejected,
                    _ => GateState::Error,
                };
                session.last_verified_descriptor = None;
                session.settled_ms = Some(session.last_frame_ms);
                if let GateFault::Rejected {
                    similarity,
                    threshold,
                    ..
                } = &fault
                {
                    session.similarity = *similarity;
                    session.threshold = *threshold;
                }
                session.message = fault.to_string();
                session.last_error = Some(fault);
            }
        }
        if session.state != from {
            tracing::info!(
                session = %session.id,
                from = ?from,
                to = ?session.state,
                message = %session.message,
                "gate transition"
            );
        }
    }
}

impl Default for VerificationGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{descriptor, face, still};

    fn obs(landmarks: Vec<Point>, seed: f32, t: u64) -> FrameObservation {
        FrameObservation {
            landmarks,
            descriptor: descriptor(seed),
            timestamp_ms: t,
        }
    }

    fn confirmed() -> MatchResponse {
        MatchResponse {
            success: Some(true),
            is_match: Some(true),
            similarity: Some(0.97),
            threshold: Some(0.95),
            message: Some("Welcome back".to_string()),
        }
    }

    /// Feed a static face from `from` to `to` (inclusive) every 100 ms,
    /// polling after each frame. Returns every request produced.
    fn feed_still(gate: &mut VerificationGate, seed: f32, from: u64, to: u64) -> Vec<MatchRequest> {
        let mut requests = Vec::new();
        let mut t = from;
        while t <= to {
            gate.on_frame(&obs(still(0.3), seed, t));
            requests.extend(gate.poll(t));
            t += 100;
        }
        requests
    }

    /// Drive a gate to `Verifying` and return the request.
    fn drive_to_request(gate: &mut VerificationGate, seed: f32) -> MatchRequest {
        let mut requests = feed_still(gate, seed, 0, 3000);
        assert!(requests.is_empty());
        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), seed, 3100));
        requests.extend(gate.poll(3100));
        gate.on_frame(&obs(still(0.3), seed, 3200));
        requests.extend(gate.poll(3200));
        requests.extend(feed_still(gate, seed, 3300, 4000));
        assert_eq!(requests.len(), 1);
        requests.remove(0)
    }

    #[test]
    fn test_idle_until_first_face() {
        let gate = VerificationGate::default();
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.status().severity, Severity::None);
        assert!(gate.next_deadline().is_none());
    }

    #[test]
    fn test_single_match_request_only_after_gates_pass() {
        let mut gate = VerificationGate::default();
        let mut before = feed_still(&mut gate, 0.0, 0, 3000);

        // Evidence arrives at 3100 (blink + head move) and 3200 (head move)
        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), 0.0, 3100));
        before.extend(gate.poll(3100));
        gate.on_frame(&obs(still(0.3), 0.0, 3200));
        assert!(before.is_empty(), "no request before evidence is complete");
        assert_eq!(gate.liveness().checks().blinks, 1);
        assert_eq!(gate.liveness().checks().head_movements, 2);

        let mut after: Vec<_> = gate.poll(3200).into_iter().collect();
        after.extend(feed_still(&mut gate, 0.0, 3300, 6000));
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].descriptor, descriptor(0.0));
        assert_eq!(gate.state(), GateState::Verifying);
    }

    #[test]
    fn test_debounce_reads_live_evidence() {
        let mut gate = VerificationGate::default();
        // Never poll while frames arrive: the debounce scheduled at t=0 is
        // clamped to its max wait and is long overdue by the time we poll.
        for t in (0..=3000).step_by(100) {
            gate.on_frame(&obs(still(0.3), 0.0, t));
        }
        gate.on_frame(&obs(still(0.18), 0.0, 3050));
        assert_eq!(gate.next_deadline(), Some(600));

        let request = gate.poll(3060);
        assert!(request.is_some(), "blink after scheduling must count");
    }

    #[test]
    fn test_progress_message_when_gates_unmet() {
        let mut gate = VerificationGate::default();
        let requests = feed_still(&mut gate, 0.0, 0, 1000);
        assert!(requests.is_empty());

        let status = gate.status();
        assert_eq!(status.state, GateState::Detecting);
        assert_eq!(status.severity, Severity::Info);
        assert!(status.message.contains("s more"), "{}", status.message);
        assert!(status.message.contains("blink 1 more"), "{}", status.message);
        assert_eq!(status.progress.required_ms, 3000);
    }

    #[test]
    fn test_time_gate_holds_even_with_evidence() {
        let mut gate = VerificationGate::default();
        gate.on_frame(&obs(still(0.30), 0.0, 0));
        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), 0.0, 300));
        gate.on_frame(&obs(still(0.30), 0.0, 600));
        assert!(gate.liveness().report().is_live);
        assert!(gate.poll(2000).is_none());
        assert_eq!(gate.state(), GateState::Detecting);
    }

    #[test]
    fn test_confirmed_match_verifies() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(req.attempt, Ok(confirmed()));

        let session = gate.session().unwrap();
        assert_eq!(session.state, GateState::Verified);
        assert_eq!(session.last_verified_descriptor.as_deref(), Some(&req.descriptor[..]));
        assert_eq!(gate.status().message, "Welcome back");
    }

    #[test]
    fn test_verified_is_stable_and_quiet_for_same_face() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(req.attempt, Ok(confirmed()));

        let more = feed_still(&mut gate, 0.01, 4100, 8000);
        assert!(more.is_empty());
        assert_eq!(gate.state(), GateState::Verified);
    }

    #[test]
    fn test_face_change_clears_verified_before_accumulating() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Verified);

        // A different person steps in, mid-blink and displaced
        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), 0.5, 4100));
        assert_eq!(gate.state(), GateState::Detecting);
        let session = gate.session().unwrap();
        assert!(session.last_verified_descriptor.is_none());
        assert_eq!(session.continuous_ms, 0);
        // Only the new frame was accumulated, against empty history
        assert_eq!(gate.liveness().checks(), LivenessChecks::default());
    }

    #[test]
    fn test_rejection_surfaces_similarity() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Ok(MatchResponse {
                success: Some(true),
                is_match: Some(false),
                similarity: Some(0.40),
                threshold: Some(0.95),
                message: None,
            }),
        );

        let status = gate.status();
        assert_eq!(status.state, GateState::Rejected);
        assert_eq!(status.severity, Severity::Retry);
        assert_eq!(status.similarity, Some(0.40));
        assert_eq!(status.threshold, Some(0.95));
        assert!(status.message.contains("40%"));
    }

    #[test]
    fn test_partial_success_is_rejected() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Ok(MatchResponse {
                is_match: Some(true),
                ..MatchResponse::default()
            }),
        );
        assert_eq!(gate.state(), GateState::Rejected);
    }

    #[test]
    fn test_malformed_response_is_rejected() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Err(MatcherError::Malformed("expected value".to_string())),
        );
        assert_eq!(gate.state(), GateState::Rejected);
    }

    #[test]
    fn test_transport_failure_is_blocking_error() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Err(MatcherError::Transport("connection refused".to_string())),
        );
        let status = gate.status();
        assert_eq!(status.state, GateState::Error);
        assert_eq!(status.severity, Severity::Blocking);
    }

    #[test]
    fn test_zero_descriptor_fails_locally() {
        let mut gate = VerificationGate::default();
        let mut requests = Vec::new();
        let zeros = vec![0.0f32; DESCRIPTOR_LEN];
        for t in (0..=4000).step_by(100) {
            let lm = if t == 3100 {
                face(0.18, 6.0, 1.0, 0.1)
            } else {
                still(0.3)
            };
            gate.on_frame(&FrameObservation {
                landmarks: lm,
                descriptor: zeros.clone(),
                timestamp_ms: t,
            });
            requests.extend(gate.poll(t));
        }
        assert!(requests.is_empty());
        let session = gate.session().unwrap();
        assert_eq!(session.state, GateState::Error);
        assert!(matches!(
            session.last_error,
            Some(GateFault::Input(crate::descriptor::DescriptorError::AllZero))
        ));
    }

    #[test]
    fn test_timeout_fails_and_late_answer_is_ignored() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        let deadline = gate.next_deadline().unwrap();

        assert!(gate.poll(deadline).is_none());
        assert_eq!(gate.state(), GateState::Error);
        assert!(matches!(
            gate.session().unwrap().last_error,
            Some(GateFault::Timeout(10_000))
        ));

        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Error);
    }

    #[test]
    fn test_answer_after_face_loss_is_discarded() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.on_face_lost(4100);
        assert_eq!(gate.state(), GateState::Idle);

        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Idle);
        assert!(gate.session().is_none());
    }

    #[test]
    fn test_answer_after_face_change_is_discarded() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.on_frame(&obs(still(0.3), 0.5, 4100));

        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Detecting);
        assert!(gate.session().unwrap().last_verified_descriptor.is_none());
    }

    #[test]
    fn test_drift_during_flight_forces_reset() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        // Consecutive steps stay within epsilon, but the total drift from the
        // sent descriptor does not.
        for (i, seed) in [0.04, 0.08].into_iter().enumerate() {
            gate.on_frame(&obs(still(0.3), seed, 4100 + i as u64 * 100));
        }
        assert_eq!(gate.state(), GateState::Verifying);

        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_slow_drift_after_verified_resets() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(req.attempt, Ok(confirmed()));
        assert_eq!(gate.state(), GateState::Verified);

        // Within epsilon of the verified descriptor: still verified
        gate.on_frame(&obs(still(0.3), 0.04, 4100));
        assert_eq!(gate.state(), GateState::Verified);

        // One more small step, but now too far from what was matched
        gate.on_frame(&obs(still(0.3), 0.08, 4200));
        assert_eq!(gate.state(), GateState::Detecting);
        let session = gate.session().unwrap();
        assert!(session.last_verified_descriptor.is_none());
        assert_eq!(session.continuous_ms, 0);
        assert_eq!(gate.liveness().checks(), LivenessChecks::default());

        // Verified never holds for a descriptor away from the matched one
        for step in 3..=10 {
            gate.on_frame(&obs(still(0.3), step as f32 * 0.04, 4000 + step * 100));
            let session = gate.session().unwrap();
            if session.state == GateState::Verified {
                let verified = session.last_verified_descriptor.as_deref().unwrap();
                assert!(same_face(verified, &session.current_descriptor, 0.05));
            }
        }
    }

    #[test]
    fn test_rejected_face_retries_with_fresh_evidence() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Ok(MatchResponse {
                success: Some(true),
                is_match: Some(false),
                similarity: Some(0.40),
                threshold: Some(0.95),
                message: None,
            }),
        );
        assert_eq!(gate.state(), GateState::Rejected);

        // The rejection stays up for retry_after_ms
        assert!(feed_still(&mut gate, 0.0, 4100, 5900).is_empty());
        assert_eq!(gate.state(), GateState::Rejected);

        gate.on_frame(&obs(still(0.3), 0.0, 6000));
        let status = gate.status();
        assert_eq!(status.state, GateState::Detecting);
        assert_eq!(status.severity, Severity::Info);
        assert_eq!(status.similarity, None);
        let session = gate.session().unwrap();
        assert_eq!(session.continuous_ms, 0);
        assert!(session.last_error.is_none());
        assert_eq!(gate.liveness().checks(), LivenessChecks::default());

        // A full continuity period without evidence is not enough
        let mut requests = feed_still(&mut gate, 0.0, 6100, 9000);
        assert!(requests.is_empty());

        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), 0.0, 9100));
        requests.extend(gate.poll(9100));
        gate.on_frame(&obs(still(0.3), 0.0, 9200));
        requests.extend(gate.poll(9200));
        requests.extend(feed_still(&mut gate, 0.0, 9300, 10_000));
        assert_eq!(requests.len(), 1);
        assert_ne!(requests[0].attempt, req.attempt);
        assert_eq!(gate.state(), GateState::Verifying);
    }

    #[test]
    fn test_error_retries_after_hold() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(
            req.attempt,
            Err(MatcherError::Transport("connection refused".to_string())),
        );
        assert_eq!(gate.state(), GateState::Error);

        feed_still(&mut gate, 0.0, 4100, 5900);
        assert_eq!(gate.state(), GateState::Error);
        gate.on_frame(&obs(still(0.3), 0.0, 6000));
        assert_eq!(gate.state(), GateState::Detecting);
    }

    #[test]
    fn test_non_finite_descriptor_fails_closed() {
        let mut gate = VerificationGate::default();
        let mut bad = descriptor(0.0);
        bad[5] = f32::NAN;

        let mut requests = Vec::new();
        let mut session_id = None;
        for t in (0..=6000).step_by(100) {
            let landmarks = if t == 3100 {
                face(0.18, 6.0, 1.0, 0.1)
            } else {
                still(0.3)
            };
            gate.on_frame(&FrameObservation {
                landmarks,
                descriptor: bad.clone(),
                timestamp_ms: t,
            });
            requests.extend(gate.poll(t));
            let id = gate.session().unwrap().id;
            assert_eq!(*session_id.get_or_insert(id), id, "session restarted at {t}");
        }

        assert!(requests.is_empty());
        let status = gate.status();
        assert_eq!(status.state, GateState::Error);
        assert_eq!(status.severity, Severity::Blocking);
        assert!(matches!(
            gate.session().unwrap().last_error,
            Some(GateFault::Input(DescriptorError::NonFinite(5)))
        ));

        // A usable descriptor starts over
        gate.on_frame(&obs(still(0.3), 0.0, 6100));
        assert_eq!(gate.state(), GateState::Detecting);
    }

    #[test]
    fn test_non_finite_descriptor_drops_verified() {
        let mut gate = VerificationGate::default();
        let req = drive_to_request(&mut gate, 0.0);
        gate.apply_match(req.attempt, Ok(confirmed()));

        let mut bad = descriptor(0.0);
        bad[0] = f32::INFINITY;
        gate.on_frame(&FrameObservation {
            landmarks: still(0.3),
            descriptor: bad,
            timestamp_ms: 4100,
        });
        assert_eq!(gate.state(), GateState::Error);
        assert!(gate.session().unwrap().last_verified_descriptor.is_none());
    }

    #[test]
    fn test_face_loss_resets_evidence() {
        let mut gate = VerificationGate::default();
        gate.on_frame(&obs(still(0.30), 0.0, 0));
        gate.on_frame(&obs(face(0.18, 6.0, 1.0, 0.1), 0.0, 300));
        assert_ne!(gate.liveness().checks(), LivenessChecks::default());

        gate.on_face_lost(400);
        assert_eq!(gate.state(), GateState::Idle);
        assert_eq!(gate.liveness().checks(), LivenessChecks::default());
        assert!(gate.next_deadline().is_none());
    }

    #[test]
    fn test_progress_summary_format() {
        let p = Progress {
            blinks: 0,
            min_blinks: 1,
            head_movements: 1,
            min_head_movements: 2,
            mouth_movements: 0,
            face_size_variations: 0,
            score: 15.0,
            detection_ms: 1800,
            required_ms: 3000,
        };
        assert_eq!(p.summary(), "blinks 0/1, head-moves 1/2, 1.8s/3.0s");
    }
}
