use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};

use crate::error::MorphError;

/// Output image format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy JPEG at the configured quality.
    #[default]
    Jpeg,

    /// Lossless PNG; quality is ignored.
    Png,

    /// Lossless WebP; quality is ignored.
    Webp,
}

impl OutputFormat {
    /// Short lowercase name, e.g. `"jpeg"`.
    pub const fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = MorphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            _ => Err(MorphError::InvalidInput(format!("unknown format: {s}"))),
        }
    }
}

/// Decode input bytes into an RGB image, flattening any alpha onto white.
pub(crate) fn decode_image(input: &[u8]) -> Result<RgbImage, MorphError> {
    let decoded = image::load_from_memory(input).map_err(|e| MorphError::DecodeError(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(MorphError::ZeroDimensions);
    }
    Ok(flatten_alpha(&decoded))
}

fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let over_white = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Encode `image` as `format`. `quality` (0.0–1.0) only affects JPEG.
pub(crate) fn encode_image(image: &RgbImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>, MorphError> {
    let mut buffer = Vec::new();
    let (width, height) = image.dimensions();
    let raw = image.as_raw();

    let result = match format {
        OutputFormat::Jpeg => {
            let quality_percent = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            JpegEncoder::new_with_quality(&mut buffer, quality_percent).write_image(
                raw,
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        OutputFormat::Png => PngEncoder::new(&mut buffer).write_image(raw, width, height, ExtendedColorType::Rgb8),
        OutputFormat::Webp => {
            WebPEncoder::new_lossless(&mut buffer).write_image(raw, width, height, ExtendedColorType::Rgb8)
        }
    };
    result.map_err(|e| MorphError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_rgb(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        })
    }

    #[test]
    fn encode_jpeg_produces_valid_output() {
        let data = encode_image(&make_test_rgb(48, 64), OutputFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn png_is_lossless() {
        let img = make_test_rgb(20, 10);
        let data = encode_image(&img, OutputFormat::Png, 0.1).unwrap();
        assert_eq!(decode_image(&data).unwrap(), img);
    }

    #[test]
    fn encode_webp_produces_riff() {
        let data = encode_image(&make_test_rgb(16, 16), OutputFormat::Webp, 0.5).unwrap();
        assert_eq!(&data[..4], b"RIFF");
        assert_eq!(&data[8..12], b"WEBP");
    }

    #[test]
    fn lower_quality_jpeg_is_smaller() {
        let img = make_test_rgb(96, 96);
        let hi = encode_image(&img, OutputFormat::Jpeg, 0.95).unwrap();
        let lo = encode_image(&img, OutputFormat::Jpeg, 0.2).unwrap();
        assert!(lo.len() < hi.len());
    }

    #[test]
    fn alpha_is_flattened_onto_white() {
        let rgba = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 0]));
        let flat = flatten_alpha(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!("gif".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().mime_type(), "image/jpeg");
    }

    #[test]
    fn invalid_input_returns_error() {
        assert!(matches!(decode_image(b"not an image"), Err(MorphError::DecodeError(_))));
    }
}
