use std::f64::consts::PI;

use image::RgbImage;

use crate::geometry::{FaceBox, Landmarks, Point, LANDMARK_COUNT};

/// Pluggable landmark estimation backend.
///
/// Implement this trait to plug a real 68-point predictor (dlib, ONNX, a face
/// mesh remapped to the iBUG layout, ...) into [`crate::FaceMorpher`].
/// Returning `None` makes the pipeline fall back to [`estimate_landmarks`].
pub trait LandmarkDetector: Send + Sync {
    /// Locate 68 landmarks for the face inside `face`.
    fn landmarks(&self, image: &RgbImage, face: &FaceBox) -> Option<Landmarks>;
}

/// Landmarks from `detector` when it finds them, otherwise a geometric estimate.
pub fn locate_landmarks(
    detector: Option<&dyn LandmarkDetector>,
    image: &RgbImage,
    face: &FaceBox,
) -> Landmarks {
    if let Some(found) = detector.and_then(|d| d.landmarks(image, face)) {
        return found;
    }
    tracing::debug!(?face, "using geometric landmark estimate");
    estimate_landmarks(image.width(), image.height(), Some(*face))
}

/// Synthesize a plausible 68-point face inside `face`.
///
/// Without a box the central 70% of the frame is used. The jaw is an arc,
/// eyebrows are short horizontal spans, the nose a shallow vertical curve,
/// and eyes and lips are ellipses, all scaled from the box. Every point is
/// clamped into the image.
pub fn estimate_landmarks(width: u32, height: u32, face: Option<FaceBox>) -> Landmarks {
    let (w, h) = (width as i32, height as i32);
    let face = face.unwrap_or(FaceBox::new(
        (w as f64 * 0.15) as i32,
        (h as f64 * 0.15) as i32,
        (w as f64 * 0.85) as i32,
        (h as f64 * 0.85) as i32,
    ));

    let x1 = face.x1.max(0);
    let y1 = face.y1.max(0);
    let x2 = face.x2.min(w).max(x1 + 1);
    let y2 = face.y2.min(h).max(y1 + 1);

    let (fw, fh) = ((x2 - x1) as f64, (y2 - y1) as f64);
    let cx = (x1 + (x2 - x1) / 2) as f64;
    let cy = (y1 + (y2 - y1) / 2) as f64;
    let (x1, y1) = (x1 as f64, y1 as f64);

    let mut pts: Vec<(f64, f64)> = Vec::with_capacity(LANDMARK_COUNT);

    for i in 0..17 {
        let t = i as f64 / 16.0;
        let a = PI * 0.1 + t * PI * 0.8;
        pts.push((cx + fw * 0.48 * a.cos(), cy + fh * 0.50 * a.sin()));
    }

    for start in [0.18, 0.60] {
        for i in 0..5 {
            pts.push((x1 + fw * (start + i as f64 / 4.0 * 0.22), y1 + fh * 0.28));
        }
    }

    for i in 0..9 {
        let t = i as f64 / 8.0;
        pts.push((cx + fw * 0.04 * (t * PI).sin(), y1 + fh * (0.38 + t * 0.22)));
    }

    let eye_y = (y1 + fh * 0.38).trunc();
    for eye_x in [(x1 + fw * 0.30).trunc(), (x1 + fw * 0.70).trunc()] {
        ellipse(&mut pts, (eye_x, eye_y), (fw * 0.07, fh * 0.035), 6);
    }

    let mouth_y = (y1 + fh * 0.72).trunc();
    ellipse(&mut pts, (cx, mouth_y), (fw * 0.16, fh * 0.05), 12);
    ellipse(&mut pts, (cx, mouth_y), (fw * 0.10, fh * 0.03), 8);

    let mut points = [Point::default(); LANDMARK_COUNT];
    for (slot, (x, y)) in points.iter_mut().zip(pts) {
        *slot = Point::new(
            (x as i32).clamp(0, (w - 1).max(0)),
            (y as i32).clamp(0, (h - 1).max(0)),
        );
    }
    Landmarks::new(points)
}

fn ellipse(pts: &mut Vec<(f64, f64)>, center: (f64, f64), radii: (f64, f64), n: usize) {
    for i in 0..n {
        let a = i as f64 / n as f64 * 2.0 * PI;
        pts.push((center.0 + radii.0 * a.cos(), center.1 + radii.1 * a.sin()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{center, Region};

    struct FixedDetector(Landmarks);

    impl LandmarkDetector for FixedDetector {
        fn landmarks(&self, _image: &RgbImage, _face: &FaceBox) -> Option<Landmarks> {
            Some(self.0.clone())
        }
    }

    struct BlindDetector;

    impl LandmarkDetector for BlindDetector {
        fn landmarks(&self, _image: &RgbImage, _face: &FaceBox) -> Option<Landmarks> {
            None
        }
    }

    #[test]
    fn estimate_stays_inside_image() {
        let lm = estimate_landmarks(120, 90, Some(FaceBox::new(-40, -40, 400, 400)));
        for p in lm.points() {
            assert!((0..120).contains(&p.x), "{p:?}");
            assert!((0..90).contains(&p.y), "{p:?}");
        }
    }

    #[test]
    fn estimate_places_features_in_order() {
        let face = FaceBox::new(100, 100, 300, 300);
        let lm = estimate_landmarks(400, 400, Some(face));

        let brow = center(lm.region(Region::RightEyebrow));
        let eye = center(lm.region(Region::RightEye));
        let mouth = center(lm.region(Region::Mouth));
        assert!(brow.y < eye.y);
        assert!(eye.y < mouth.y);

        let right = center(lm.region(Region::RightEye));
        let left = center(lm.region(Region::LeftEye));
        assert!(right.x < left.x);
        assert_eq!(right.y, left.y);

        // Chin sits near the bottom of the box.
        assert!(lm[8].y > 280);
        assert!((195..=205).contains(&mouth.x), "{mouth:?}");
    }

    #[test]
    fn estimate_without_box_uses_central_region() {
        let lm = estimate_landmarks(200, 100, None);
        let c = lm.face_center();
        assert!((90..=110).contains(&c.x));
        assert!(!lm.is_degenerate());
    }

    #[test]
    fn estimate_handles_tiny_images() {
        let lm = estimate_landmarks(1, 1, None);
        assert!(lm.points().iter().all(|p| *p == Point::new(0, 0)));
    }

    #[test]
    fn locate_prefers_detector() {
        let image = RgbImage::new(50, 50);
        let face = FaceBox::new(10, 10, 40, 40);
        let fixed = Landmarks::new([Point::new(7, 7); LANDMARK_COUNT]);
        let detector = FixedDetector(fixed.clone());
        assert_eq!(locate_landmarks(Some(&detector), &image, &face), fixed);
    }

    #[test]
    fn locate_falls_back_when_detector_misses() {
        let image = RgbImage::new(50, 50);
        let face = FaceBox::new(10, 10, 40, 40);
        let located = locate_landmarks(Some(&BlindDetector), &image, &face);
        assert_eq!(located, estimate_landmarks(50, 50, Some(face)));
        assert_eq!(locate_landmarks(None, &image, &face), located);
    }
}
