//! Police-lineup backdrop: gradient wall, height ruler, header and footer bars.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::font::{draw_text, text_width};

/// Ruler spans 4'0" (48 in) to 7'0".
const RULER_FIRST_FOOT: u32 = 4;
const RULER_LAST_FOOT: u32 = 7;
const RULER_SPAN_INCHES: f64 = 36.0;
const LABEL_MARGIN: i32 = 8;
const MIN_HEADER_HEIGHT: u32 = 28;

/// Colours and title of the rendered backdrop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackdropStyle {
    /// Wall colour at the top row.
    pub wall_top: [u8; 3],
    /// Added to `wall_top` progressively toward the bottom row.
    pub wall_delta: [u8; 3],
    pub major_mark: [u8; 3],
    pub minor_mark: [u8; 3],
    /// Header and footer fill.
    pub bar: [u8; 3],
    pub title: String,
    pub title_color: [u8; 3],
    pub footer_color: [u8; 3],
}

impl Default for BackdropStyle {
    fn default() -> Self {
        Self {
            wall_top: [70, 40, 30],
            wall_delta: [30, 20, 20],
            major_mark: [230, 210, 200],
            minor_mark: [165, 145, 130],
            bar: [45, 18, 12],
            title: "METROPOLITAN POLICE DEPARTMENT".to_string(),
            title_color: [255, 220, 210],
            footer_color: [210, 185, 170],
        }
    }
}

/// Booking details printed in the footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterStamp {
    pub case_number: u32,
    /// `YYYY-MM-DD`.
    pub date: String,
}

impl FooterStamp {
    pub fn new(case_number: u32, date: impl Into<String>) -> Self {
        Self {
            case_number,
            date: date.into(),
        }
    }

    /// Random case number in `1000..9999` and today's UTC date.
    pub fn now() -> Self {
        let case_number = rand::thread_rng().gen_range(1000..9999);
        let days = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0);
        let (y, m, d) = civil_date(days as i64);
        Self::new(case_number, format!("{y:04}-{m:02}-{d:02}"))
    }

    pub fn text(&self) -> String {
        format!("CASE#: {}    DATE: {}    BOOKING", self.case_number, self.date)
    }
}

/// Gregorian (year, month, day) for a count of days since 1970-01-01.
fn civil_date(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

fn fill_rows(image: &mut RgbImage, top: i32, rows: u32, color: Rgb<u8>) {
    if rows == 0 || image.width() == 0 {
        return;
    }
    draw_filled_rect_mut(image, Rect::at(0, top).of_size(image.width(), rows), color);
}

/// Render a `width` × `height` lineup backdrop.
pub fn render_backdrop(width: u32, height: u32, style: &BackdropStyle, stamp: &FooterStamp) -> RgbImage {
    let mut bg = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return bg;
    }
    let (w, h) = (width as i32, height as i32);

    for (y, row) in bg.enumerate_rows_mut() {
        let t = y as f64 / height as f64;
        let mut color = [0u8; 3];
        for (c, v) in color.iter_mut().enumerate() {
            *v = (style.wall_top[c] as f64 + t * style.wall_delta[c] as f64) as u8;
        }
        for (_, _, pixel) in row {
            *pixel = Rgb(color);
        }
    }

    let ruler_top = (h as f64 * 0.05) as i32;
    let ruler_bot = (h as f64 * 0.90) as i32;
    let range = (ruler_bot - ruler_top) as f64;
    for foot in RULER_FIRST_FOOT..=RULER_LAST_FOOT {
        for half in [0, 6] {
            let inches = (foot * 12 + half - RULER_FIRST_FOOT * 12) as f64;
            let y = ruler_bot - (inches / RULER_SPAN_INCHES * range) as i32;
            if y < 0 || y >= h {
                continue;
            }
            let major = half == 0;
            let (color, thickness, scale) = if major {
                (Rgb(style.major_mark), 2, 2)
            } else {
                (Rgb(style.minor_mark), 1, 1)
            };
            fill_rows(&mut bg, y, thickness, color);

            let label = format!("{foot}'{half}\"");
            let tw = text_width(&label, scale) as i32;
            draw_text(&mut bg, &label, LABEL_MARGIN, y - 4, scale, color);
            draw_text(&mut bg, &label, w - tw - LABEL_MARGIN, y - 4, scale, color);
        }
    }

    let header = MIN_HEADER_HEIGHT.max((height as f64 * 0.065) as u32);
    fill_rows(&mut bg, 0, header, Rgb(style.bar));
    draw_text(
        &mut bg,
        &style.title,
        (w as f64 * 0.08) as i32,
        header as i32 / 2 + 7,
        2,
        Rgb(style.title_color),
    );

    let footer = (h as f64 * 0.92) as i32;
    fill_rows(&mut bg, footer, (h - footer) as u32, Rgb(style.bar));
    draw_text(
        &mut bg,
        &stamp.text(),
        10,
        footer + ((h - footer) as f64 * 0.65) as i32,
        1,
        Rgb(style.footer_color),
    );
    bg
}

struct CachedBackdrop {
    width: u32,
    height: u32,
    image: RgbImage,
}

/// Single-slot cache of the last rendered backdrop, keyed by size.
///
/// Each miss renders with a fresh [`FooterStamp`]; hits return an exact copy
/// of the stored image.
#[derive(Default)]
pub struct BackdropCache {
    slot: Mutex<Option<CachedBackdrop>>,
}

impl BackdropCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdrop for `width` × `height`, rendered on first use of that size.
    pub fn get_or_render(&self, width: u32, height: u32, style: &BackdropStyle) -> RgbImage {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = slot.as_ref() {
            if cached.width == width && cached.height == height {
                tracing::debug!(width, height, "backdrop cache hit");
                return cached.image.clone();
            }
        }
        tracing::debug!(width, height, "backdrop cache miss");
        let image = render_backdrop(width, height, style, &FooterStamp::now());
        *slot = Some(CachedBackdrop {
            width,
            height,
            image: image.clone(),
        });
        image
    }

    /// Size of the cached backdrop, if any.
    pub fn cached_size(&self) -> Option<(u32, u32)> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|c| (c.width, c.height))
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
