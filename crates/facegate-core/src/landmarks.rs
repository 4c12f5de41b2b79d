//! Landmark point type and shape normalization.
//!
//! Face detectors hand landmarks over in several shapes: a bare list of
//! `[x, y]` pairs, a list of `{x, y}` objects, or either of those wrapped in a
//! `{ "positions": [...] }` envelope. [`RawLandmarks`] accepts all of them at
//! the input boundary and [`RawLandmarks::normalize`] flattens them into the
//! single `Vec<Point>` representation every geometry function works on.

use serde::Deserialize;

/// Number of points in the 68-point facial landmark layout.
pub const LANDMARK_COUNT: usize = 68;

/// Indices into the 68-point layout used by the liveness pipeline.
pub mod index {
    use std::ops::Range;

    /// Leftmost jaw point (face boundary).
    pub const JAW_LEFT: usize = 0;
    /// Chin.
    pub const CHIN: usize = 8;
    /// Rightmost jaw point (face boundary).
    pub const JAW_RIGHT: usize = 16;
    /// Nose tip.
    pub const NOSE_TIP: usize = 30;
    /// Six-point contour of the subject's right eye.
    pub const RIGHT_EYE: Range<usize> = 36..42;
    /// Six-point contour of the subject's left eye.
    pub const LEFT_EYE: Range<usize> = 42..48;
    /// Outer mouth corners.
    pub const MOUTH_LEFT: usize = 48;
    pub const MOUTH_RIGHT: usize = 54;
    /// Inner lip midpoints.
    pub const INNER_LIP_TOP: usize = 62;
    pub const INNER_LIP_BOTTOM: usize = 66;
}

/// A 2D landmark position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// Mean position of a set of points. `None` for an empty set.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// One landmark as delivered by a detector.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    Pair([f32; 2]),
    Object { x: f32, y: f32 },
}

impl From<RawPoint> for Point {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Pair(pair) => pair.into(),
            RawPoint::Object { x, y } => Point::new(x, y),
        }
    }
}

/// Landmark set in any of the accepted wire shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLandmarks {
    Flat(Vec<RawPoint>),
    Wrapped { positions: Vec<RawPoint> },
}

impl RawLandmarks {
    /// Flatten into the internal point sequence.
    ///
    /// Shape is the only thing resolved here. Point count and finiteness are
    /// checked by the consumers, which fail closed on anything but a full
    /// 68-point set.
    pub fn normalize(self) -> Vec<Point> {
        let raw = match self {
            RawLandmarks::Flat(points) => points,
            RawLandmarks::Wrapped { positions } => positions,
        };
        raw.into_iter().map(Point::from).collect()
    }
}

/// Borrow `points` as a full 68-point set, or `None` if it is short or holds
/// non-finite coordinates.
pub fn as_full_set(points: &[Point]) -> Option<&[Point]> {
    if points.len() < LANDMARK_COUNT {
        return None;
    }
    let set = &points[..LANDMARK_COUNT];
    set.iter().all(Point::is_finite).then_some(set)
}
