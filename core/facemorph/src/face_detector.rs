use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::font::draw_text;
use crate::geometry::FaceBox;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([128, 255, 0]);

/// A face found by a [`FaceDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    /// Bounding box in image pixels.
    pub bbox: FaceBox,
    /// Detection confidence score.
    pub confidence: f64,
}

/// Pluggable face detection backend.
///
/// Implement this trait to provide a custom face detector (ONNX, YOLO, Haar,
/// etc.) and pass it to [`crate::FaceMorpher::face_detector`].
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<DetectedFace>;
}

/// Highest-confidence face, if any.
pub fn best_face(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    faces.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Copy of `image` with a 2px box and a confidence label over each face.
pub fn annotate_faces(image: &RgbImage, faces: &[DetectedFace]) -> RgbImage {
    let mut annotated = image.clone();
    for face in faces {
        let b = face.bbox;
        for inset in 0..2 {
            let (w, h) = (b.width() - 2 * inset, b.height() - 2 * inset);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(b.x1 + inset, b.y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut annotated, rect, ANNOTATION_COLOR);
        }
        let label = format!("FACE {:.2}", face.confidence);
        draw_text(&mut annotated, &label, b.x1, b.y1 - 10, 2, ANNOTATION_COLOR);
    }
    annotated
}
