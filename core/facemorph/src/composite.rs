use image::{Rgb, RgbImage};

use crate::backdrop::{BackdropCache, BackdropStyle};
use crate::geometry::FaceBox;
use crate::matte::{segment_person, AlphaMask, MatteConfig};

/// Vignette gain on the normalised `16·x(1−x)·y(1−y)` falloff.
const VIGNETTE_GAIN: f32 = 1.15;

/// Blend `subject` over `backdrop` through `mask`, then vignette.
///
/// The output has the subject's size. Mask values missing from a smaller
/// mask count as opaque; missing backdrop pixels as black.
pub fn composite(subject: &RgbImage, mask: &AlphaMask, backdrop: &RgbImage) -> RgbImage {
    let (mw, mh) = mask.dimensions();
    let blended = RgbImage::from_fn(subject.width(), subject.height(), |x, y| {
        let m = if x < mw && y < mh { mask.get(x, y) } else { 1.0 };
        let s = subject.get_pixel(x, y).0;
        let b = backdrop.get_pixel_checked(x, y).map_or([0; 3], |p| p.0);
        let mut out = [0u8; 3];
        for c in 0..3 {
            out[c] = (s[c] as f32 * m + b[c] as f32 * (1.0 - m)).clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    });
    add_vignette(&blended)
}

/// Darken toward the frame edges; the centre is left untouched.
pub fn add_vignette(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let norm = |v: u32, n: u32| if n > 1 { v as f32 / (n - 1) as f32 } else { 0.0 };
    RgbImage::from_fn(w, h, |x, y| {
        let gx = norm(x, w);
        let gy = norm(y, h);
        let v = (16.0 * gy * (1.0 - gy) * gx * (1.0 - gx) * VIGNETTE_GAIN).clamp(0.0, 1.0);
        let p = image.get_pixel(x, y).0;
        Rgb([
            (p[0] as f32 * v) as u8,
            (p[1] as f32 * v) as u8,
            (p[2] as f32 * v) as u8,
        ])
    })
}

/// Swaps a portrait's background for a lineup backdrop.
///
/// Owns the backdrop cache, so share one instance (e.g. behind an `Arc`)
/// across requests to reuse backdrops of the same size.
#[derive(Default)]
pub struct BackgroundReplacer {
    config: MatteConfig,
    style: BackdropStyle,
    cache: BackdropCache,
}

impl BackgroundReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(config: MatteConfig, style: BackdropStyle) -> Self {
        Self {
            config,
            style,
            cache: BackdropCache::new(),
        }
    }

    pub fn config(&self) -> &MatteConfig {
        &self.config
    }

    pub fn style(&self) -> &BackdropStyle {
        &self.style
    }

    /// Cached backdrop of the given size.
    pub fn backdrop(&self, width: u32, height: u32) -> RgbImage {
        self.cache.get_or_render(width, height, &self.style)
    }

    /// Segment the person at `face` and composite them over the backdrop.
    pub fn segment_and_composite(&self, image: &RgbImage, face: &FaceBox) -> RgbImage {
        let (w, h) = image.dimensions();
        let backdrop = self.backdrop(w, h);
        let mask = segment_person(image, face, &self.config);
        composite(image, &mask, &backdrop)
    }
}
