use image::{Rgb, RgbImage};

/// Per-pixel source coordinates for a backward warp.
///
/// Destination pixel `(x, y)` is sampled from source
/// `(map_x[y * width + x], map_y[y * width + x])`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementField {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl DisplacementField {
    /// Field that maps every pixel onto itself.
    pub fn identity(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let mut map_x = Vec::with_capacity(len);
        let mut map_y = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                map_x.push(x as f32);
                map_y.push(y as f32);
            }
        }
        Self {
            width,
            height,
            map_x,
            map_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source coordinate sampled by destination `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> (f32, f32) {
        let i = self.index(x, y);
        (self.map_x[i], self.map_y[i])
    }

    pub fn set(&mut self, x: u32, y: u32, src_x: f32, src_y: f32) {
        let i = self.index(x, y);
        self.map_x[i] = src_x;
        self.map_y[i] = src_y;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Resample `source` through this field with bilinear interpolation.
    ///
    /// Out-of-range coordinates are mirrored back into the image with the
    /// edge pixel repeated, so the result never contains fill pixels.
    pub fn remap(&self, source: &RgbImage) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        if source.width() == 0 || source.height() == 0 {
            return out;
        }
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let (sx, sy) = self.get(x, y);
            *pixel = sample_bilinear(source, sx, sy);
        }
        out
    }
}

/// Mirror `i` into `0..n`, repeating the edge sample (`cba|abc|cba`).
pub(crate) fn reflect(i: i64, n: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m >= n {
        period - m - 1
    } else {
        m
    }
}

/// Pull a source coordinate into `[-limit, limit]`; NaN maps to 0.
fn bounded(v: f32, limit: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-limit, limit)
    }
}

/// Bilinear sample with reflected borders.
pub(crate) fn sample_bilinear(image: &RgbImage, fx: f32, fy: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let limit = 4.0 * w.max(h) as f32;
    let (fx, fy) = (bounded(fx, limit), bounded(fy, limit));
    let x0f = fx.floor();
    let y0f = fy.floor();
    let dx = fx - x0f;
    let dy = fy - y0f;
    let (x0, y0) = (x0f as i64, y0f as i64);

    let xa = reflect(x0, w) as u32;
    let xb = reflect(x0 + 1, w) as u32;
    let ya = reflect(y0, h) as u32;
    let yb = reflect(y0 + 1, h) as u32;

    let p00 = image.get_pixel(xa, ya).0;
    let p10 = image.get_pixel(xb, ya).0;
    let p01 = image.get_pixel(xa, yb).0;
    let p11 = image.get_pixel(xb, yb).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - dx) * (1.0 - dy)
            + p10[c] as f32 * dx * (1.0 - dy)
            + p01[c] as f32 * (1.0 - dx) * dy
            + p11[c] as f32 * dx * dy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
