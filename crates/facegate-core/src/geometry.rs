//! Pure geometry over facial landmarks.
//!
//! All functions take already-normalized [`Point`] slices and return `None`
//! when the input cannot support the measurement (too few points, degenerate
//! denominators, non-finite coordinates). Callers treat `None` as "no signal
//! this frame", never as zero.

use crate::landmarks::{as_full_set, index, Point};

/// Euclidean distance between two points.
///
/// Accepts anything convertible into a [`Point`], so `(x, y)` tuples and
/// `[x, y]` arrays can be passed directly.
pub fn distance(a: impl Into<Point>, b: impl Into<Point>) -> f32 {
    let (a, b) = (a.into(), b.into());
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dx * dx + dy * dy).sqrt()
}

/// Eye aspect ratio over a six-point eye contour.
///
/// `(|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)` with p0/p3 the eye corners.
/// Returns `None` if fewer than six usable points are given or the corners
/// coincide.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f32> {
    if eye.len() < 6 || !eye[..6].iter().all(Point::is_finite) {
        return None;
    }
    let horizontal = distance(eye[0], eye[3]);
    if horizontal == 0.0 {
        return None;
    }
    let vertical = distance(eye[1], eye[5]) + distance(eye[2], eye[4]);
    Some(vertical / (2.0 * horizontal))
}

/// Mean EAR of both eyes of a 68-point set.
pub fn mean_eye_aspect_ratio(landmarks: &[Point]) -> Option<f32> {
    let set = as_full_set(landmarks)?;
    let right = eye_aspect_ratio(&set[index::RIGHT_EYE])?;
    let left = eye_aspect_ratio(&set[index::LEFT_EYE])?;
    Some((right + left) / 2.0)
}

/// Horizontal face extent, jaw boundary to jaw boundary.
pub fn face_width(landmarks: &[Point]) -> Option<f32> {
    let set = as_full_set(landmarks)?;
    Some(distance(set[index::JAW_LEFT], set[index::JAW_RIGHT]))
}

/// Approximate face area: `|nose tip - chin| * |left boundary - right boundary|`.
pub fn face_area(landmarks: &[Point]) -> Option<f32> {
    let set = as_full_set(landmarks)?;
    let height = distance(set[index::NOSE_TIP], set[index::CHIN]);
    let width = distance(set[index::JAW_LEFT], set[index::JAW_RIGHT]);
    Some(height * width)
}

/// Mouth aspect ratio: inner-lip vertical gap over mouth-corner width.
pub fn mouth_aspect_ratio(landmarks: &[Point]) -> Option<f32> {
    let set = as_full_set(landmarks)?;
    let width = distance(set[index::MOUTH_LEFT], set[index::MOUTH_RIGHT]);
    if width == 0.0 {
        return None;
    }
    let gap = distance(set[index::INNER_LIP_TOP], set[index::INNER_LIP_BOTTOM]);
    Some(gap / width)
}
