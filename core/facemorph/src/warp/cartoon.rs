//! Comic-book filter: repeated bilateral smoothing masked by adaptive edges.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::{box_filter, median_filter};

const BILATERAL_RADIUS: i32 = 4;
const SIGMA_SCALE: f64 = 75.0;
const MEDIAN_RADIUS: u32 = 3;
const THRESHOLD_RADIUS: u32 = 4;
/// Smoothing passes stop here; strength 2 needs 4.
const MAX_PASSES: u32 = 8;

/// `round(2s)` bilateral passes, at least one and at most [`MAX_PASSES`].
fn pass_count(strength: f64) -> u32 {
    (2.0 * strength).round().max(1.0).min(MAX_PASSES as f64) as u32
}

pub(crate) fn cartoon(image: &RgbImage, strength: f32) -> RgbImage {
    let s = strength as f64;
    let passes = pass_count(s);
    let sigma = (SIGMA_SCALE * s).trunc().max(1.0);
    let offset = (2.0 + 3.0 * s) as i32;
    tracing::debug!(passes, sigma, offset, "cartoon filter");

    let mut smooth = image.clone();
    for _ in 0..passes {
        smooth = bilateral(&smooth, sigma, sigma);
    }

    let edges = edge_mask(image, offset);
    for (pixel, edge) in smooth.pixels_mut().zip(edges.pixels()) {
        if edge.0[0] == 0 {
            pixel.0 = [0, 0, 0];
        }
    }
    smooth
}

/// Mirror `i` into `0..n` without repeating the edge sample (`dcb|abcd|cba`).
fn reflect101(i: i32, n: i32) -> i32 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    if m >= n {
        period - m
    } else {
        m
    }
}

/// Edge-preserving smoothing over a circular window of radius 4.
///
/// Range weights use the L1 colour distance between neighbour and centre.
fn bilateral(image: &RgbImage, sigma_color: f64, sigma_space: f64) -> RgbImage {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let mut out = RgbImage::new(image.width(), image.height());
    if w == 0 || h == 0 {
        return out;
    }

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let mut offsets = Vec::new();
    for dy in -BILATERAL_RADIUS..=BILATERAL_RADIUS {
        for dx in -BILATERAL_RADIUS..=BILATERAL_RADIUS {
            let r2 = (dx * dx + dy * dy) as f64;
            if r2 > (BILATERAL_RADIUS * BILATERAL_RADIUS) as f64 {
                continue;
            }
            offsets.push((dx, dy, (r2 * space_coeff).exp()));
        }
    }
    // Colour distance is at most 3 * 255.
    let color_weight: Vec<f64> = (0..=765)
        .map(|d| ((d * d) as f64 * color_coeff).exp())
        .collect();

    for y in 0..h {
        for x in 0..w {
            let c = image.get_pixel(x as u32, y as u32).0;
            let mut sum = [0.0f64; 3];
            let mut wsum = 0.0;
            for &(dx, dy, ws) in &offsets {
                let nx = reflect101(x + dx, w) as u32;
                let ny = reflect101(y + dy, h) as u32;
                let n = image.get_pixel(nx, ny).0;
                let dist: i32 = (0..3).map(|k| (n[k] as i32 - c[k] as i32).abs()).sum();
                let weight = ws * color_weight[dist as usize];
                for k in 0..3 {
                    sum[k] += n[k] as f64 * weight;
                }
                wsum += weight;
            }
            let px = out.get_pixel_mut(x as u32, y as u32);
            for k in 0..3 {
                px.0[k] = (sum[k] / wsum).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// 255 where the blurred luminance is brighter than its 9×9 mean minus
/// `offset`, 0 on dark outlines.
fn edge_mask(image: &RgbImage, offset: i32) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let blurred = median_filter(&gray, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let mean = box_filter(&blurred, THRESHOLD_RADIUS, THRESHOLD_RADIUS);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let src = blurred.get_pixel(x, y).0[0] as i32;
        let m = mean.get_pixel(x, y).0[0] as i32;
        Luma([if src - m > -offset { 255 } else { 0 }])
    })
}
