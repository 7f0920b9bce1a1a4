//! Person/background separation seeded from a face box.
//!
//! The subject's body is guessed from the face geometry, segmented with two
//! rounds of GrabCut, snapped to nearby image edges, cleaned up
//! morphologically and finally feathered into a soft [`AlphaMask`].

mod cleanup;
mod grabcut;
mod maxflow;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

use crate::geometry::FaceBox;

pub use cleanup::keep_largest_component;
pub use grabcut::{grabcut, Label, Trimap};

/// Tunables for [`segment_person`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatteConfig {
    /// Body box extends this many face heights above the face.
    pub body_above: f32,
    /// Body box extends this many face heights below the face.
    pub body_below: f32,
    /// Body box extends this many face widths to each side.
    pub body_sides: f32,
    /// GrabCut rounds seeded from the body rectangle.
    pub rect_iterations: u32,
    /// GrabCut rounds after pinning the face and the frame.
    pub refine_iterations: u32,
    /// Face padding, as a fraction of the shorter face side.
    pub face_pad: f32,
    /// Frame border (pixels) forced to background before refinement.
    pub frame_border: u32,
    /// Smoothness weight between neighbouring pixels.
    pub gamma: f64,
    /// Seed for the k-means initialisation of the colour models.
    pub seed: u64,
    pub edge_blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub edge_dilate_radius: u8,
    /// Half-width of the band around the mask boundary where edges count.
    pub boundary_band_radius: u8,
    pub close_radius: u8,
    pub open_radius: u8,
    pub feather_sigma: f32,
    /// Gain applied to the feathered mask before clamping to 1.
    pub feather_gain: f32,
}

impl Default for MatteConfig {
    fn default() -> Self {
        Self {
            body_above: 0.5,
            body_below: 6.5,
            body_sides: 1.8,
            rect_iterations: 5,
            refine_iterations: 3,
            face_pad: 0.15,
            frame_border: 4,
            gamma: 50.0,
            seed: 0x5eed,
            edge_blur_sigma: 1.1,
            canny_low: 30.0,
            canny_high: 100.0,
            edge_dilate_radius: 1,
            boundary_band_radius: 6,
            close_radius: 14,
            open_radius: 3,
            feather_sigma: 3.5,
            feather_gain: 1.4,
        }
    }
}

/// Soft per-pixel subject opacity in `[0, 1]`; 1 is subject.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask(ImageBuffer<Luma<f32>, Vec<f32>>);

impl AlphaMask {
    pub fn from_pixel(width: u32, height: u32, value: f32) -> Self {
        Self(ImageBuffer::from_pixel(width, height, Luma([value.clamp(0.0, 1.0)])))
    }

    /// Fully opaque mask.
    pub fn ones(width: u32, height: u32) -> Self {
        Self::from_pixel(width, height, 1.0)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.0.get_pixel(x, y).0[0]
    }

    pub fn values(&self) -> &[f32] {
        self.0.as_raw()
    }

    /// Scale a binary 0/255 mask to `[0, 1]`.
    pub fn from_binary(binary: &GrayImage) -> Self {
        Self(ImageBuffer::from_fn(binary.width(), binary.height(), |x, y| {
            Luma([binary.get_pixel(x, y).0[0] as f32 / 255.0])
        }))
    }

    /// Quantize to an 8-bit image, e.g. for saving a debug matte.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([(self.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Expand a face box into a rough full-body box, clamped to the image.
///
/// `None` when the clamped box is under 2 px on either side.
pub fn body_box(face: &FaceBox, width: u32, height: u32, config: &MatteConfig) -> Option<FaceBox> {
    let (fw, fh) = (face.width() as f32, face.height() as f32);
    let body = FaceBox::new(
        face.x1 - (fw * config.body_sides) as i32,
        face.y1 - (fh * config.body_above) as i32,
        face.x2 + (fw * config.body_sides) as i32,
        face.y2 + (fh * config.body_below) as i32,
    )
    .clamped(width, height);
    (body.width() >= 2 && body.height() >= 2).then_some(body)
}

/// Estimate a soft matte of the person whose face is at `face`.
///
/// Never fails: a degenerate face or body box yields a fully opaque mask, and
/// segmentation failures fall back to the body rectangle.
pub fn segment_person(image: &RgbImage, face: &FaceBox, config: &MatteConfig) -> AlphaMask {
    let (w, h) = image.dimensions();
    let face = face.clamped(w, h);
    if face.width() < 2 || face.height() < 2 {
        tracing::debug!(?face, "face too small to segment, keeping whole frame");
        return AlphaMask::ones(w, h);
    }
    let Some(body) = body_box(&face, w, h, config) else {
        tracing::debug!(?face, "body box collapsed, keeping whole frame");
        return AlphaMask::ones(w, h);
    };

    let trimap = seed_trimap(image, &face, &body, config);
    let mut binary = trimap.to_binary();
    cleanup::snap_to_edges(image, &mut binary, config);
    let binary = cleanup::smooth(&binary, config);
    let binary = keep_largest_component(&binary);
    feather(&binary, config)
}

/// Two GrabCut passes: body rectangle, then with the face pinned to
/// foreground and the frame edge pinned to background.
fn seed_trimap(image: &RgbImage, face: &FaceBox, body: &FaceBox, config: &MatteConfig) -> Trimap {
    let (w, h) = image.dimensions();
    let mut trimap = Trimap::from_rect(w, h, body);
    if let Err(e) = grabcut(image, &mut trimap, config.rect_iterations, config.gamma, config.seed) {
        tracing::warn!("rectangle segmentation failed, using body box: {e}");
        trimap = Trimap::from_rect(w, h, body);
    }

    let pad = (face.width().min(face.height()) as f32 * config.face_pad) as i32;
    trimap.fill(&face.padded(pad, w, h), Label::Foreground);
    trimap.fill_border(config.frame_border, Label::Background);

    if let Err(e) = grabcut(image, &mut trimap, config.refine_iterations, config.gamma, config.seed) {
        tracing::warn!("refinement segmentation failed, keeping seeds: {e}");
    }
    trimap
}

fn feather(binary: &GrayImage, config: &MatteConfig) -> AlphaMask {
    let blurred = gaussian_blur_f32(binary, config.feather_sigma);
    let gain = config.feather_gain;
    AlphaMask(ImageBuffer::from_fn(binary.width(), binary.height(), |x, y| {
        let v = blurred.get_pixel(x, y).0[0] as f32 / 255.0;
        Luma([(v * gain).clamp(0.0, 1.0)])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_box_follows_face_proportions() {
        let config = MatteConfig::default();
        let face = FaceBox::new(100, 50, 140, 100);
        let body = body_box(&face, 1000, 1000, &config).unwrap();
        assert_eq!(body, FaceBox::new(28, 25, 212, 425));

        let clamped = body_box(&face, 200, 150, &config).unwrap();
        assert_eq!(clamped, FaceBox::new(28, 25, 200, 150));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = MatteConfig {
            close_radius: 9,
            ..MatteConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: MatteConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: MatteConfig = serde_json::from_str(r#"{"gamma": 20.0}"#).unwrap();
        assert_eq!(partial.gamma, 20.0);
        assert_eq!(partial.rect_iterations, 5);
    }

    #[test]
    fn tiny_face_keeps_everything() {
        let image = RgbImage::new(30, 20);
        let mask = segment_person(&image, &FaceBox::new(5, 5, 6, 40), &MatteConfig::default());
        assert_eq!(mask.dimensions(), (30, 20));
        assert!(mask.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn body_box_covering_frame_falls_back_to_rectangle() {
        // Face box whose body box spans the whole 60×60 frame, so the first
        // GrabCut pass has no background samples.
        let face = FaceBox::new(15, 5, 45, 35);
        let image = RgbImage::from_fn(60, 60, |x, y| {
            let (dx, dy) = (x as f32 - 30.0, y as f32 - 20.0);
            if dx * dx / 225.0 + dy * dy / 225.0 <= 1.0 {
                image::Rgb([210, 165, 135])
            } else if y > 35 && (x as i32 - 30).abs() < 18 {
                image::Rgb([30, 30, 45])
            } else {
                image::Rgb([90, 130, 170])
            }
        });
        let config = MatteConfig::default();
        let body = body_box(&face, 60, 60, &config).unwrap();
        assert_eq!(body, FaceBox::new(0, 0, 60, 60));

        let trimap = seed_trimap(&image, &face, &body, &config);
        assert_eq!(trimap.get(0, 0), Label::Background);
        assert_eq!(trimap.get(59, 30), Label::Background);
        assert_eq!(trimap.get(30, 20), Label::Foreground);

        let mask = segment_person(&image, &face, &config);
        assert_eq!(mask.dimensions(), (60, 60));
        assert!(mask.values().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(mask.get(30, 20) > 0.99, "face alpha {}", mask.get(30, 20));
        assert!(mask.get(0, 0) < 0.05, "corner alpha {}", mask.get(0, 0));
    }

    #[test]
    fn face_outside_frame_keeps_everything() {
        let image = RgbImage::new(30, 20);
        let mask = segment_person(&image, &FaceBox::new(50, 50, 80, 80), &MatteConfig::default());
        assert!(mask.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn feather_saturates_interior() {
        let mut binary = GrayImage::new(60, 60);
        for y in 10..50 {
            for x in 10..50 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        let mask = feather(&binary, &MatteConfig::default());
        assert_eq!(mask.get(30, 30), 1.0);
        assert_eq!(mask.get(0, 0), 0.0);
        let edge = mask.get(10, 30);
        assert!(edge > 0.3 && edge <= 1.0, "edge alpha {edge}");
    }

    #[test]
    fn alpha_mask_helpers() {
        let mut binary = GrayImage::new(4, 2);
        binary.put_pixel(1, 0, Luma([255]));
        let mask = AlphaMask::from_binary(&binary);
        assert_eq!(mask.get(1, 0), 1.0);
        assert_eq!(mask.get(0, 0), 0.0);
        assert_eq!(mask.to_gray(), binary);
        assert_eq!(AlphaMask::from_pixel(2, 2, 3.0).get(1, 1), 1.0);
    }
}
