//! Landmark-driven face warping with optional mugshot-style background replacement.
//!
//! # Example
//!
//! ```no_run
//! use facemorph::{Effect, FaceBox, FaceMorpher};
//!
//! let raw_bytes = std::fs::read("selfie.jpg").unwrap();
//! let result = FaceMorpher::new(raw_bytes)
//!     .unwrap()
//!     .face(FaceBox::new(120, 80, 280, 260))
//!     .effect(Effect::BigEyes)
//!     .strength(1.4)
//!     .process()
//!     .unwrap();
//! println!("Morphed: {} bytes", result.data.len());
//! ```

mod backdrop;
mod codec;
mod composite;
mod error;
/// Face detection traits and data types.
pub mod face_detector;
mod font;
/// Points, face boxes and the 68-point landmark layout.
pub mod geometry;
/// Landmark detection traits and the geometric fallback.
pub mod landmarks;
/// Person segmentation.
pub mod matte;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
/// Face warping effects.
pub mod warp;

use std::sync::Arc;

use image::RgbImage;

pub use backdrop::{render_backdrop, BackdropCache, BackdropStyle, FooterStamp};
pub use codec::OutputFormat;
pub use composite::{add_vignette, composite, BackgroundReplacer};
/// Error type returned by facemorph operations.
pub use error::MorphError;
pub use face_detector::{annotate_faces, best_face, DetectedFace, FaceDetector};
pub use geometry::{FaceBox, Landmarks, Point, Region, LANDMARK_COUNT};
pub use landmarks::{estimate_landmarks, locate_landmarks, LandmarkDetector};
pub use matte::{segment_person, AlphaMask, MatteConfig};
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;
pub use warp::{apply_effect, list_effects, DisplacementField, Effect, EffectInfo};

/// Result of a single [`FaceMorpher::process`] run.
#[derive(Debug, Clone)]
pub struct MorphedPhoto {
    /// The encoded output image.
    pub data: Vec<u8>,

    /// The output format used.
    pub format: OutputFormat,

    /// Width of the output image in pixels.
    pub width: u32,

    /// Height of the output image in pixels.
    pub height: u32,

    /// Effect that was applied.
    pub effect: Effect,

    /// Strength the effect was applied at.
    pub strength: f32,

    /// Face box the effect and background were anchored to.
    pub face: FaceBox,

    /// Landmarks that drove the warp.
    pub landmarks: Landmarks,

    /// Whether the background was replaced.
    pub background_replaced: bool,
}

/// A warped image before encoding.
#[derive(Debug, Clone)]
pub struct RenderedFace {
    pub image: RgbImage,
    pub face: FaceBox,
    pub landmarks: Landmarks,
}

/// Run `detector` over `image` and return every face it finds.
pub fn detect_faces(image: &RgbImage, detector: &dyn FaceDetector) -> Vec<DetectedFace> {
    let gray = image::imageops::grayscale(image);
    detector.detect(gray.as_raw(), gray.width(), gray.height())
}

/// Builder for warping a face photo.
///
/// Decodes the input on construction, then locates the face and its
/// landmarks, applies the effect, optionally swaps the background and
/// encodes the result.
pub struct FaceMorpher {
    image: RgbImage,
    effect: Effect,
    strength: f32,
    face: Option<FaceBox>,
    landmarks: Option<Landmarks>,
    detector: Option<Box<dyn FaceDetector>>,
    landmark_detector: Option<Box<dyn LandmarkDetector>>,
    background: Option<Arc<BackgroundReplacer>>,
    format: OutputFormat,
    quality: f32,
}

impl FaceMorpher {
    /// Create a morpher from raw image bytes (JPEG, PNG or WebP).
    pub fn new(input: impl AsRef<[u8]>) -> Result<Self, MorphError> {
        Ok(Self::from_image(codec::decode_image(input.as_ref())?))
    }

    /// Create a morpher from an already decoded image.
    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            effect: Effect::default(),
            strength: 1.0,
            face: None,
            landmarks: None,
            detector: None,
            landmark_detector: None,
            background: None,
            format: OutputFormat::default(),
            quality: 0.92,
        }
    }

    /// Effect to apply (default: [`Effect::Bulge`]).
    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    /// Select the effect by id; unknown ids fall back to bulge.
    pub fn effect_id(mut self, id: &str) -> Self {
        self.effect = Effect::from_id_or_default(id);
        self
    }

    /// Effect intensity, conventionally 0.0–2.0 (default: 1.0).
    ///
    /// Any finite value is accepted. The cartoon effect stops adding
    /// smoothing passes above strength 4.
    pub fn strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    /// Use this face box instead of running a detector.
    pub fn face(mut self, face: FaceBox) -> Self {
        self.face = Some(face);
        self
    }

    /// Detector used when no face box is given.
    ///
    /// ```no_run
    /// use facemorph::{DetectedFace, FaceDetector, FaceMorpher};
    ///
    /// struct MyDetector;
    /// impl FaceDetector for MyDetector {
    ///     fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<DetectedFace> {
    ///         // Your detection logic here
    ///         vec![]
    ///     }
    /// }
    ///
    /// let bytes = std::fs::read("selfie.jpg").unwrap();
    /// let result = FaceMorpher::new(bytes).unwrap()
    ///     .face_detector(Box::new(MyDetector))
    ///     .process();
    /// ```
    pub fn face_detector(mut self, detector: Box<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Landmark predictor; when absent or when it misses, landmarks are
    /// estimated geometrically from the face box.
    pub fn landmark_detector(mut self, detector: Box<dyn LandmarkDetector>) -> Self {
        self.landmark_detector = Some(detector);
        self
    }

    /// Use these landmarks as-is. Without an explicit face box, the face is
    /// taken as their bounding box.
    pub fn landmarks(mut self, landmarks: Landmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Replace the background behind the subject after warping.
    pub fn background(mut self, replacer: Arc<BackgroundReplacer>) -> Self {
        self.background = Some(replacer);
        self
    }

    /// Output format (default: [`OutputFormat::Jpeg`]).
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Encoding quality from 0.0 to 1.0 (default: 0.92). JPEG only.
    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    fn resolve_face(&self) -> Result<FaceBox, MorphError> {
        let (w, h) = self.image.dimensions();
        if let Some(face) = self.face {
            return Ok(face.clamped(w, h));
        }
        if let Some(landmarks) = &self.landmarks {
            return Ok(landmark_hull(landmarks).clamped(w, h));
        }
        let detector = self.detector.as_deref().ok_or(MorphError::NoFaceDetected)?;
        let faces = detect_faces(&self.image, detector);
        tracing::debug!(count = faces.len(), "face detection");
        best_face(&faces)
            .map(|f| f.bbox.clamped(w, h))
            .ok_or(MorphError::NoFaceDetected)
    }

    /// Warp (and optionally re-background) without encoding.
    pub fn render(self) -> Result<RenderedFace, MorphError> {
        if !self.strength.is_finite() {
            return Err(MorphError::InvalidInput(format!(
                "strength must be finite, got {}",
                self.strength
            )));
        }
        let face = self.resolve_face()?;
        let landmarks = match &self.landmarks {
            Some(lm) => lm.clone(),
            None => locate_landmarks(self.landmark_detector.as_deref(), &self.image, &face),
        };

        let mut image = apply_effect(&self.image, Some(&landmarks), self.effect, self.strength);
        if let Some(replacer) = &self.background {
            image = replacer.segment_and_composite(&image, &face);
        }
        Ok(RenderedFace {
            image,
            face,
            landmarks,
        })
    }

    /// Run the full pipeline and encode the result.
    pub fn process(self) -> Result<MorphedPhoto, MorphError> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(MorphError::InvalidInput(format!(
                "quality must be within 0.0–1.0, got {}",
                self.quality
            )));
        }
        let (effect, strength, format, quality) = (self.effect, self.strength, self.format, self.quality);
        let background_replaced = self.background.is_some();
        let (w, h) = self.image.dimensions();

        let rendered = self.render()?;
        tracing::info!(
            %effect,
            strength,
            face = ?rendered.face,
            width = w,
            height = h,
            background_replaced,
            "morphed face"
        );
        let data = codec::encode_image(&rendered.image, format, quality)?;

        Ok(MorphedPhoto {
            data,
            format,
            width: rendered.image.width(),
            height: rendered.image.height(),
            effect,
            strength,
            face: rendered.face,
            landmarks: rendered.landmarks,
            background_replaced,
        })
    }
}

/// Axis-aligned bounding box of all landmark points.
fn landmark_hull(landmarks: &Landmarks) -> FaceBox {
    let pts = landmarks.points();
    let x1 = pts.iter().map(|p| p.x).min().unwrap_or(0);
    let y1 = pts.iter().map(|p| p.y).min().unwrap_or(0);
    let x2 = pts.iter().map(|p| p.x).max().unwrap_or(0);
    let y2 = pts.iter().map(|p| p.y).max().unwrap_or(0);
    FaceBox::new(x1, y1, x2, y2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_png(width: u32, height: u32) -> Vec<u8> {
        use image::codecs::png::PngEncoder;
        use image::ImageEncoder;

        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                128,
            ])
        });
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    struct FixedDetector(Vec<DetectedFace>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<DetectedFace> {
            self.0.clone()
        }
    }

    #[test]
    fn builder_defaults() {
        let png = make_test_png(120, 160);
        let result = FaceMorpher::new(png)
            .unwrap()
            .face(FaceBox::new(30, 40, 90, 110))
            .process()
            .unwrap();
        assert_eq!(result.effect, Effect::Bulge);
        assert_eq!(result.strength, 1.0);
        assert_eq!(result.format, OutputFormat::Jpeg);
        assert_eq!((result.width, result.height), (120, 160));
        assert_eq!(&result.data[..2], &[0xFF, 0xD8]);
        assert!(!result.background_replaced);
    }

    #[test]
    fn builder_with_png_format() {
        let png = make_test_png(64, 64);
        let result = FaceMorpher::new(png)
            .unwrap()
            .face(FaceBox::new(16, 16, 48, 48))
            .effect(Effect::Squeeze)
            .format(OutputFormat::Png)
            .process()
            .unwrap();
        assert_eq!(&result.data[1..4], b"PNG");
    }

    #[test]
    fn effect_id_is_lenient() {
        let png = make_test_png(64, 64);
        let result = FaceMorpher::new(png)
            .unwrap()
            .face(FaceBox::new(16, 16, 48, 48))
            .effect_id("does_not_exist")
            .process()
            .unwrap();
        assert_eq!(result.effect, Effect::Bulge);
    }

    #[test]
    fn missing_face_is_an_error() {
        let png = make_test_png(64, 64);
        let result = FaceMorpher::new(png).unwrap().process();
        assert!(matches!(result, Err(MorphError::NoFaceDetected)));

        let png = make_test_png(64, 64);
        let result = FaceMorpher::new(png)
            .unwrap()
            .face_detector(Box::new(FixedDetector(vec![])))
            .process();
        assert!(matches!(result, Err(MorphError::NoFaceDetected)));
    }

    #[test]
    fn detector_picks_most_confident_face() {
        let faces = vec![
            DetectedFace {
                bbox: FaceBox::new(0, 0, 10, 10),
                confidence: 0.2,
            },
            DetectedFace {
                bbox: FaceBox::new(20, 20, 60, 60),
                confidence: 0.95,
            },
        ];
        let png = make_test_png(80, 80);
        let result = FaceMorpher::new(png)
            .unwrap()
            .face_detector(Box::new(FixedDetector(faces)))
            .process()
            .unwrap();
        assert_eq!(result.face, FaceBox::new(20, 20, 60, 60));
    }

    #[test]
    fn explicit_landmarks_define_face() {
        let landmarks = estimate_landmarks(100, 100, Some(FaceBox::new(20, 20, 80, 80)));
        let result = FaceMorpher::from_image(RgbImage::new(100, 100))
            .landmarks(landmarks.clone())
            .process()
            .unwrap();
        assert_eq!(result.landmarks, landmarks);
        assert_eq!(result.face, landmark_hull(&landmarks));
    }

    #[test]
    fn invalid_quality_and_strength_are_rejected() {
        let morpher = || FaceMorpher::from_image(RgbImage::new(32, 32)).face(FaceBox::new(4, 4, 28, 28));
        assert!(matches!(morpher().quality(1.5).process(), Err(MorphError::InvalidInput(_))));
        assert!(matches!(morpher().quality(-0.1).process(), Err(MorphError::InvalidInput(_))));
        assert!(matches!(
            morpher().strength(f32::NAN).process(),
            Err(MorphError::InvalidInput(_))
        ));
    }

    #[test]
    fn builder_invalid_input() {
        assert!(matches!(
            FaceMorpher::new(b"not an image"),
            Err(MorphError::DecodeError(_))
        ));
    }

    #[test]
    fn background_replacement_keeps_size() {
        let png = make_test_png(60, 80);
        let replacer = Arc::new(BackgroundReplacer::new());
        let result = FaceMorpher::new(png)
            .unwrap()
            .face(FaceBox::new(22, 10, 38, 30))
            .background(Arc::clone(&replacer))
            .process()
            .unwrap();
        assert!(result.background_replaced);
        assert_eq!((result.width, result.height), (60, 80));
        assert_eq!(replacer.backdrop(60, 80).dimensions(), (60, 80));
    }
}
