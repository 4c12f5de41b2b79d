//! Synthetic landmark and descriptor fixtures shared by unit tests.

use crate::descriptor::DESCRIPTOR_LEN;
use crate::landmarks::{index, Point, LANDMARK_COUNT};

/// Synthetic 68-point face, 120 px wide.
///
/// `ear` sets both eye contours, `dx` translates the whole face,
/// `scale` scales it about the origin, `mar` sets the inner-lip gap.
pub fn face(ear: f32, dx: f32, scale: f32, mar: f32) -> Vec<Point> {
    let mut pts = vec![Point::new(60.0, 70.0); LANDMARK_COUNT];
    pts[index::JAW_LEFT] = Point::new(0.0, 40.0);
    pts[index::JAW_RIGHT] = Point::new(120.0, 40.0);
    pts[index::NOSE_TIP] = Point::new(60.0, 60.0);
    pts[index::CHIN] = Point::new(60.0, 110.0);
    pts[index::MOUTH_LEFT] = Point::new(45.0, 85.0);
    pts[index::MOUTH_RIGHT] = Point::new(75.0, 85.0);
    let gap = mar * 30.0;
    pts[index::INNER_LIP_TOP] = Point::new(60.0, 85.0 - gap / 2.0);
    pts[index::INNER_LIP_BOTTOM] = Point::new(60.0, 85.0 + gap / 2.0);

    let h = ear * 30.0 / 2.0;
    for (range, x0) in [(index::RIGHT_EYE, 20.0f32), (index::LEFT_EYE, 70.0f32)] {
        let eye: [(f32, f32); 6] = [
            (x0, 40.0),
            (x0 + 10.0, 40.0 - h),
            (x0 + 20.0, 40.0 - h),
            (x0 + 30.0, 40.0),
            (x0 + 20.0, 40.0 + h),
            (x0 + 10.0, 40.0 + h),
        ];
        for (slot, p) in range.zip(eye) {
            pts[slot] = p.into();
        }
    }

    pts.into_iter()
        .map(|p| Point::new(p.x * scale + dx, p.y * scale))
        .collect()
}

/// Open-eyed, closed-mouth face at the origin.
pub fn still(ear: f32) -> Vec<Point> {
    face(ear, 0.0, 1.0, 0.1)
}

/// Deterministic non-zero descriptor. Seeds further apart than 0.05 are
/// different faces.
pub fn descriptor(seed: f32) -> Vec<f32> {
    (0..DESCRIPTOR_LEN)
        .map(|i| (i as f32 / DESCRIPTOR_LEN as f32) - 0.5 + seed)
        .collect()
}
