use std::sync::Arc;
use std::time::Duration;

use facegate_core::{
    FrameObservation, GateConfig, GateStatus, IdentityMatcher, MatchRequest, MatchResponse,
    MatcherError, VerificationGate,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::frames::Detection;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gate task exited")]
    ChannelClosed,
}

type MatchOutcome = (u64, Result<MatchResponse, MatcherError>);

/// Clone-safe handle to the gate task.
#[derive(Clone)]
pub struct GateHandle {
    tx: mpsc::Sender<Detection>,
    status: watch::Receiver<GateStatus>,
}

impl GateHandle {
    /// Forward one detection tick to the gate.
    pub async fn submit(&self, detection: Detection) -> Result<(), EngineError> {
        self.tx
            .send(detection)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Watch the UI status. Every change is published, including progress counters.
    pub fn subscribe(&self) -> watch::Receiver<GateStatus> {
        self.status.clone()
    }
}

/// Spawn the gate on its own task.
///
/// The task is the sole owner of the [`VerificationGate`]: frames, timer
/// deadlines and matcher completions are all applied from one loop, so the
/// gate's run-to-completion handlers never interleave. Remote calls run on
/// the blocking pool and report back through a channel, tagged with their
/// attempt id.
pub fn spawn_gate<M: IdentityMatcher>(
    config: GateConfig,
    matcher: Arc<M>,
) -> (GateHandle, JoinHandle<()>) {
    let gate = VerificationGate::new(config);
    let (tx, rx) = mpsc::channel::<Detection>(32);
    let (status_tx, status_rx) = watch::channel(gate.status());

    let task = tokio::spawn(run_gate(gate, matcher, rx, status_tx));
    (
        GateHandle {
            tx,
            status: status_rx,
        },
        task,
    )
}

async fn run_gate<M: IdentityMatcher>(
    mut gate: VerificationGate,
    matcher: Arc<M>,
    mut rx: mpsc::Receiver<Detection>,
    status_tx: watch::Sender<GateStatus>,
) {
    let epoch = Instant::now();
    let elapsed_ms = move || epoch.elapsed().as_millis() as u64;
    let (done_tx, mut done_rx) = mpsc::channel::<MatchOutcome>(4);
    tracing::info!("gate task started");

    loop {
        let deadline = gate
            .next_deadline()
            .map(|ms| epoch + Duration::from_millis(ms));

        tokio::select! {
            detection = rx.recv() => match detection {
                Some(Detection::Face { landmarks, descriptor }) => {
                    gate.on_frame(&FrameObservation {
                        landmarks,
                        descriptor,
                        timestamp_ms: elapsed_ms(),
                    });
                }
                Some(Detection::NoFace) => gate.on_face_lost(elapsed_ms()),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
            Some((attempt, outcome)) = done_rx.recv() => {
                gate.apply_match(attempt, outcome);
            }
        }

        if let Some(request) = gate.poll(elapsed_ms()) {
            dispatch(
                request,
                Arc::clone(&matcher),
                gate.config().match_timeout_ms,
                done_tx.clone(),
            );
        }

        let status = gate.status();
        status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    tracing::info!("gate task exiting");
}

fn dispatch<M: IdentityMatcher>(
    request: MatchRequest,
    matcher: Arc<M>,
    timeout_ms: u64,
    done: mpsc::Sender<MatchOutcome>,
) {
    tokio::spawn(async move {
        let MatchRequest {
            attempt,
            descriptor,
        } = request;
        let call = tokio::task::spawn_blocking(move || matcher.match_descriptor(&descriptor));
        let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::error!(attempt, error = %join_err, "matcher task failed");
                Err(MatcherError::Transport(join_err.to_string()))
            }
            Err(_) => Err(MatcherError::Timeout(timeout_ms)),
        };
        // Gate task gone means shutdown; the answer has nowhere to go.
        let _ = done.send((attempt, outcome)).await;
    });
}
