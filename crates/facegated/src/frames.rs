//! Detector output ingestion.
//!
//! The face detector writes one JSON object per detection tick:
//!
//! ```json
//! {"face": {"landmarks": [[x, y], ...], "descriptor": [...], "score": 0.97}}
//! {"face": null}
//! ```
//!
//! Landmarks may be `[x, y]` pairs, `{x, y}` objects, or either wrapped in
//! `{"positions": [...]}`; they are normalized here, once.

use facegate_core::{Point, RawLandmarks};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, Lines};

#[derive(Error, Debug)]
pub enum FrameParseError {
    #[error("malformed detection line: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct DetectionLine {
    #[serde(default)]
    face: Option<DetectedFace>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    landmarks: RawLandmarks,
    descriptor: Vec<f32>,
    #[serde(default)]
    score: Option<f32>,
}

/// One tick of detector output after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Face {
        landmarks: Vec<Point>,
        descriptor: Vec<f32>,
    },
    NoFace,
}

/// Parse one line. Faces scored below `min_confidence` count as no face.
/// Blank lines yield `None`.
pub fn parse_line(line: &str, min_confidence: f32) -> Result<Option<Detection>, FrameParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: DetectionLine = serde_json::from_str(line)?;
    let detection = match parsed.face {
        Some(face) if face.score.map_or(true, |s| s >= min_confidence) => Detection::Face {
            landmarks: face.landmarks.normalize(),
            descriptor: face.descriptor,
        },
        Some(face) => {
            tracing::debug!(score = ?face.score, min_confidence, "detection below confidence floor");
            Detection::NoFace
        }
        None => Detection::NoFace,
    };
    Ok(Some(detection))
}

/// Read the next usable detection, skipping blank and malformed lines.
/// Returns `None` at end of input.
pub async fn next_detection<R>(
    lines: &mut Lines<R>,
    min_confidence: f32,
) -> std::io::Result<Option<Detection>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line, min_confidence) {
            Ok(Some(detection)) => return Ok(Some(detection)),
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "skipping detector line");
            }
        }
    }
    Ok(None)
}
