//! Points, face boxes and the fixed 68-point landmark layout.

use serde::{Deserialize, Serialize};

use crate::error::MorphError;

/// Number of points in a landmark set.
pub const LANDMARK_COUNT: usize = 68;

/// Faces whose jaw-derived radius is below this are treated as absent.
const DEGENERATE_FACE_RADIUS: i32 = 5;

/// Face radius margin over the farthest jaw point.
pub(crate) const FACE_RADIUS_MARGIN: f64 = 1.1;

/// An integer pixel coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Face bounding box as `(x1, y1)`–`(x2, y2)` corners in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl FaceBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width in pixels, zero for inverted boxes.
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    /// Height in pixels, zero for inverted boxes.
    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    /// Clamp both corners into a `width` × `height` image.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// Grow the box by `pad` on every side, clamped to the image.
    pub fn padded(&self, pad: i32, width: u32, height: u32) -> Self {
        Self::new(self.x1 - pad, self.y1 - pad, self.x2 + pad, self.y2 + pad).clamped(width, height)
    }
}

/// Named anatomical slices of a landmark set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Jaw,
    RightEyebrow,
    LeftEyebrow,
    Nose,
    RightEye,
    LeftEye,
    OuterMouth,
    InnerMouth,
    /// Outer and inner lips together.
    Mouth,
}

impl Region {
    /// Index range of this region within the 68 points.
    pub const fn range(self) -> std::ops::Range<usize> {
        match self {
            Region::Jaw => 0..17,
            Region::RightEyebrow => 17..22,
            Region::LeftEyebrow => 22..27,
            Region::Nose => 27..36,
            Region::RightEye => 36..42,
            Region::LeftEye => 42..48,
            Region::OuterMouth => 48..60,
            Region::InnerMouth => 60..68,
            Region::Mouth => 48..68,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Region::Jaw => "jaw",
            Region::RightEyebrow => "right eyebrow",
            Region::LeftEyebrow => "left eyebrow",
            Region::Nose => "nose",
            Region::RightEye => "right eye",
            Region::LeftEye => "left eye",
            Region::OuterMouth => "outer mouth",
            Region::InnerMouth => "inner mouth",
            Region::Mouth => "mouth",
        }
    }
}

/// Exactly 68 facial landmarks in the iBUG ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmarks {
    points: [Point; LANDMARK_COUNT],
}

impl Landmarks {
    pub const fn new(points: [Point; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a slice, rejecting anything but exactly 68 points.
    pub fn try_from_slice(points: &[Point]) -> Result<Self, MorphError> {
        let points: [Point; LANDMARK_COUNT] = points.try_into().map_err(|_| {
            MorphError::InvalidInput(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                points.len()
            ))
        })?;
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn region(&self, region: Region) -> &[Point] {
        &self.points[region.range()]
    }

    /// Mean of all 68 points.
    pub fn face_center(&self) -> Point {
        center(&self.points)
    }

    /// Distance from [`Self::face_center`] to the farthest jaw point, with margin.
    pub fn face_radius(&self) -> i32 {
        let c = self.face_center();
        (max_distance(self.region(Region::Jaw), c) * FACE_RADIUS_MARGIN) as i32
    }

    /// True when the jaw collapses to a few pixels and no warp can be placed.
    pub fn is_degenerate(&self) -> bool {
        self.face_radius() < DEGENERATE_FACE_RADIUS
    }
}

impl std::ops::Index<usize> for Landmarks {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// Arithmetic mean, truncated toward zero. Empty input gives the origin.
pub fn center(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0i64, 0i64), |(sx, sy), p| (sx + p.x as i64, sy + p.y as i64));
    Point::new((sx as f64 / n) as i32, (sy as f64 / n) as i32)
}

/// Largest Euclidean distance from `origin` to any point, zero for an empty slice.
pub fn max_distance(points: &[Point], origin: Point) -> f64 {
    points
        .iter()
        .map(|p| p.distance(&origin))
        .fold(0.0, f64::max)
}

/// Width and height of the axis-aligned hull of `points`.
pub fn extent(points: &[Point]) -> (i32, i32) {
    let Some(first) = points.first() else {
        return (0, 0);
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    (max_x - min_x, max_y - min_y)
}

/// Radius of a feature: its larger extent scaled by `margin`, truncated.
pub fn feature_radius(points: &[Point], margin: f64) -> i32 {
    let (w, h) = extent(points);
    (w.max(h) as f64 * margin) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle_landmarks(cx: i32, cy: i32, r: f64) -> Landmarks {
        let mut points = [Point::default(); LANDMARK_COUNT];
        for (i, p) in points.iter_mut().enumerate() {
            let a = i as f64 / LANDMARK_COUNT as f64 * std::f64::consts::TAU;
            *p = Point::new(cx + (r * a.cos()).round() as i32, cy + (r * a.sin()).round() as i32);
        }
        Landmarks::new(points)
    }

    #[test]
    fn center_truncates_mean() {
        let pts = [Point::new(0, 0), Point::new(3, 4), Point::new(4, 4)];
        assert_eq!(center(&pts), Point::new(2, 2));
    }

    #[test]
    fn center_of_empty_is_origin() {
        assert_eq!(center(&[]), Point::new(0, 0));
        assert_eq!(max_distance(&[], Point::new(3, 3)), 0.0);
        assert_eq!(extent(&[]), (0, 0));
    }

    #[test]
    fn extent_and_feature_radius() {
        let pts = [Point::new(10, 20), Point::new(16, 22), Point::new(12, 18)];
        assert_eq!(extent(&pts), (6, 4));
        assert_eq!(feature_radius(&pts, 1.5), 9);
        assert_eq!(feature_radius(&pts, 1.8), 10);
    }

    #[test]
    fn region_ranges_cover_all_points() {
        let regions = [
            Region::Jaw,
            Region::RightEyebrow,
            Region::LeftEyebrow,
            Region::Nose,
            Region::RightEye,
            Region::LeftEye,
            Region::OuterMouth,
            Region::InnerMouth,
        ];
        let total: usize = regions.iter().map(|r| r.range().len()).sum();
        assert_eq!(total, LANDMARK_COUNT);
        assert_eq!(Region::Mouth.range(), 48..68);
    }

    #[test]
    fn try_from_slice_rejects_wrong_count() {
        let pts = vec![Point::new(1, 1); 67];
        assert!(matches!(
            Landmarks::try_from_slice(&pts),
            Err(MorphError::InvalidInput(_))
        ));
        let pts = vec![Point::new(1, 1); 68];
        assert!(Landmarks::try_from_slice(&pts).is_ok());
    }

    #[test]
    fn face_radius_of_circle() {
        let lm = circle_landmarks(100, 100, 50.0);
        assert_eq!(lm.face_center(), Point::new(100, 100));
        let r = lm.face_radius();
        assert!((54..=55).contains(&r), "radius {r}");
        assert!(!lm.is_degenerate());
    }

    #[test]
    fn collapsed_landmarks_are_degenerate() {
        let lm = Landmarks::new([Point::new(40, 40); LANDMARK_COUNT]);
        assert_eq!(lm.face_radius(), 0);
        assert!(lm.is_degenerate());
    }

    #[test]
    fn face_box_clamps_and_pads() {
        let b = FaceBox::new(-5, 10, 120, 90).clamped(100, 80);
        assert_eq!(b, FaceBox::new(0, 10, 100, 80));
        assert_eq!(b.width(), 100);
        assert_eq!(b.height(), 70);

        let p = FaceBox::new(10, 10, 20, 20).padded(3, 100, 100);
        assert_eq!(p, FaceBox::new(7, 7, 23, 23));
        assert_eq!(FaceBox::new(5, 5, 2, 2).width(), 0);
    }
}
