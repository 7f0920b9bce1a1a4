//! Landmark-anchored displacement warps: bulge, squeeze, big eyes, wide smile.

use image::{GenericImageView, RgbImage};

use super::field::DisplacementField;
use crate::error::MorphError;
use crate::geometry::{center, feature_radius, Landmarks, Point, Region};

/// Eye radius = larger eye extent × this.
const EYE_RADIUS_MARGIN: f64 = 1.5;
/// Eyes smaller than this (pixels) are left alone.
const MIN_EYE_RADIUS: i32 = 5;
/// Extra pixels around each eye's warp radius.
const EYE_REGION_PAD: i32 = 10;

/// Mouth radius = larger mouth extent × this.
const MOUTH_RADIUS_MARGIN: f64 = 1.8;
/// Mouths smaller than this (pixels) are left alone.
const MIN_MOUTH_RADIUS: i32 = 10;
/// Extra pixels around the mouth's warp radius.
const MOUTH_REGION_PAD: i32 = 15;

/// Radial power-law scale: `d^(1 + amount) / d`, 1 at the center.
fn radial_scale(norm_dist: f64, amount: f64) -> f64 {
    if norm_dist > 0.0 {
        norm_dist.powf(1.0 + amount) / norm_dist
    } else {
        1.0
    }
}

/// Build a field over `width` × `height` where every pixel strictly within
/// `radius` of `center` gets its source from `law(dx, dy, norm_dist)`.
fn radial_field<F>(width: u32, height: u32, center: Point, radius: i32, law: F) -> DisplacementField
where
    F: Fn(f64, f64, f64) -> (f64, f64),
{
    let mut field = DisplacementField::identity(width, height);
    if radius <= 0 {
        return field;
    }
    let r = radius as f64;
    let (cx, cy) = (center.x as f64, center.y as f64);
    for y in 0..height {
        let dy = y as f64 - cy;
        for x in 0..width {
            let dx = x as f64 - cx;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist >= r {
                continue;
            }
            let (sx, sy) = law(dx, dy, dist / r);
            field.set(x, y, (cx + sx) as f32, (cy + sy) as f32);
        }
    }
    field
}

/// Source field for [`bulge`], exposed for inspection.
pub(crate) fn bulge_field(width: u32, height: u32, landmarks: &Landmarks, strength: f32) -> DisplacementField {
    let amount = strength as f64 * 0.5;
    radial_field(width, height, landmarks.face_center(), landmarks.face_radius(), |dx, dy, d| {
        let scale = radial_scale(d, amount);
        (dx * scale, dy * scale)
    })
}

/// Inflate the face: pixels near the center sample from closer in,
/// pushing content outward toward the face radius.
pub(crate) fn bulge(image: &RgbImage, landmarks: &Landmarks, strength: f32) -> RgbImage {
    bulge_field(image.width(), image.height(), landmarks, strength).remap(image)
}

/// Stretch the face horizontally and compress it vertically, strongest at
/// the center and fading to nothing at the face radius.
pub(crate) fn squeeze(image: &RgbImage, landmarks: &Landmarks, strength: f32) -> RgbImage {
    let squeeze = strength as f64 * 0.3;
    radial_field(
        image.width(),
        image.height(),
        landmarks.face_center(),
        landmarks.face_radius(),
        |dx, dy, d| {
            let falloff = 1.0 - d;
            let sx = 1.0 + squeeze * falloff;
            let sy = 1.0 - squeeze * 0.5 * falloff;
            (dx * sx, dy * sy)
        },
    )
    .remap(image)
}

/// Sub-rectangle of an image: `x1..x2`, `y1..y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl Window {
    /// Square of half-size `reach` around `center`, clamped; `None` when empty.
    fn around(center: Point, reach: i32, width: u32, height: u32) -> Option<Self> {
        let clamp = |v: i32, hi: u32| v.clamp(0, hi as i32) as u32;
        let window = Self {
            x1: clamp(center.x - reach, width),
            y1: clamp(center.y - reach, height),
            x2: clamp(center.x + reach, width),
            y2: clamp(center.y + reach, height),
        };
        (window.x2 > window.x1 && window.y2 > window.y1).then_some(window)
    }

    fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Warp one window of `image` in place. The field is built in window-local
/// coordinates, so border reflection happens at the window's edges.
fn warp_window(image: &mut RgbImage, window: Window, field: impl FnOnce(u32, u32) -> DisplacementField) {
    let region = image
        .view(window.x1, window.y1, window.width(), window.height())
        .to_image();
    let warped = field(window.width(), window.height()).remap(&region);
    for (x, y, pixel) in warped.enumerate_pixels() {
        image.put_pixel(window.x1 + x, window.y1 + y, *pixel);
    }
}

fn local_radius(points: &[Point], region: Region, margin: f64, min: i32) -> Result<i32, MorphError> {
    let radius = feature_radius(points, margin);
    if radius < min {
        return Err(MorphError::DegenerateRegion {
            region: region.name(),
            radius,
        });
    }
    Ok(radius)
}

/// Magnify each eye with a local bulge, right eye first.
pub(crate) fn big_eyes(image: &RgbImage, landmarks: &Landmarks, strength: f32) -> RgbImage {
    let mut result = image.clone();
    let magnify = strength as f64 * 0.6;

    for region in [Region::RightEye, Region::LeftEye] {
        let eye = landmarks.region(region);
        let radius = match local_radius(eye, region, EYE_RADIUS_MARGIN, MIN_EYE_RADIUS) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("skipping eye warp: {e}");
                continue;
            }
        };
        let c = center(eye);
        let Some(window) = Window::around(c, radius + EYE_REGION_PAD, result.width(), result.height())
        else {
            continue;
        };
        let local = Point::new(c.x - window.x1 as i32, c.y - window.y1 as i32);
        warp_window(&mut result, window, |w, h| {
            radial_field(w, h, local, radius, |dx, dy, d| {
                let scale = radial_scale(d, magnify);
                (dx * scale, dy * scale)
            })
        });
    }
    result
}

/// Widen the mouth and lift its corners into a grin.
pub(crate) fn wide_smile(image: &RgbImage, landmarks: &Landmarks, strength: f32) -> RgbImage {
    let mut result = image.clone();
    let mouth = landmarks.region(Region::Mouth);
    let radius = match local_radius(mouth, Region::Mouth, MOUTH_RADIUS_MARGIN, MIN_MOUTH_RADIUS) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("skipping smile warp: {e}");
            return result;
        }
    };
    let c = center(mouth);
    let Some(window) = Window::around(c, radius + MOUTH_REGION_PAD, result.width(), result.height())
    else {
        return result;
    };

    let stretch = strength as f64 * 0.3;
    let curve = strength as f64 * 5.0;
    let r = radius as f64;
    let local = Point::new(c.x - window.x1 as i32, c.y - window.y1 as i32);
    warp_window(&mut result, window, |w, h| {
        radial_field(w, h, local, radius, |dx, dy, d| {
            let falloff = 1.0 - d;
            let sx = 1.0 + stretch * falloff;
            let lift = -curve * falloff * (dx / r).powi(2);
            (dx * sx, dy + lift)
        })
    });
    result
}
