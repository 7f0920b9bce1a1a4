use std::path::Path;

use crate::error::MorphError;
use crate::face_detector::{DetectedFace, FaceDetector};
use crate::geometry::FaceBox;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) is not bundled;
/// load it from disk with [`RustfaceDetector::from_path`] or from memory with
/// [`RustfaceDetector::from_bytes`].
pub struct RustfaceDetector {
    model: rustface::Model,
    min_face_size: u32,
}

impl RustfaceDetector {
    /// Load the model from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MorphError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            MorphError::InvalidInput(format!("cannot read face model {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Load the model from an in-memory copy of the model file.
    pub fn from_bytes(model_data: &[u8]) -> Result<Self, MorphError> {
        let model = rustface::read_model(std::io::Cursor::new(model_data))
            .map_err(|e| MorphError::InvalidInput(format!("invalid face model: {e}")))?;
        Ok(Self {
            model,
            min_face_size: 50,
        })
    }

    /// Smallest face edge in pixels the detector searches for (default: 50).
    pub fn min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<DetectedFace> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));
        tracing::debug!(count = faces.len(), "rustface detections");

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let x1 = bbox.x();
                let y1 = bbox.y();
                DetectedFace {
                    bbox: FaceBox::new(
                        x1,
                        y1,
                        x1 + bbox.width() as i32,
                        y1 + bbox.height() as i32,
                    )
                    .clamped(width, height),
                    confidence: face.score(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_invalid_input() {
        let result = RustfaceDetector::from_path("/nonexistent/seeta_fd_frontal_v1.0.bin");
        match result {
            Err(MorphError::InvalidInput(msg)) => assert!(msg.contains("seeta_fd_frontal_v1.0.bin")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("model loaded from a missing file"),
        }
    }
}
