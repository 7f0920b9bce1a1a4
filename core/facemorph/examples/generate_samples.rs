//! Render every effect, with and without the lineup background, for one image.
//!
//! Usage:
//!   cargo run --example generate_samples -- <image> <x1> <y1> <x2> <y2> [output_dir]
//!
//! Without arguments a synthetic portrait is used. Output goes to
//! `target/samples/` unless a directory is given.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use facemorph::{BackgroundReplacer, Effect, FaceBox, FaceMorpher, OutputFormat};
use image::{Rgb, RgbImage};

fn synthetic_portrait() -> (RgbImage, FaceBox) {
    let face = FaceBox::new(140, 70, 220, 170);
    let image = RgbImage::from_fn(360, 400, |x, y| {
        let dx = (x as f64 - 180.0) / 40.0;
        let dy = (y as f64 - 120.0) / 50.0;
        let shade = ((x + y) % 7) as u8;
        if dx * dx + dy * dy <= 1.0 {
            Rgb([220 - shade, 175 - shade, 145])
        } else if y > 170 && (x as i32 - 180).abs() < 70 {
            Rgb([40, 45 + shade, 70])
        } else {
            Rgb([150 + shade, 160 + shade, 150])
        }
    });
    (image, face)
}

fn load_input(args: &[String]) -> (RgbImage, FaceBox, PathBuf) {
    let default_out = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../target/samples"));
    if args.len() < 5 {
        let (image, face) = synthetic_portrait();
        return (image, face, default_out);
    }
    let bytes = std::fs::read(&args[0]).unwrap_or_else(|e| panic!("failed to read {}: {e}", args[0]));
    let image = image::load_from_memory(&bytes)
        .expect("failed to decode input")
        .to_rgb8();
    let coord = |i: usize| -> i32 { args[i].parse().unwrap_or_else(|_| panic!("bad coordinate {}", args[i])) };
    let face = FaceBox::new(coord(1), coord(2), coord(3), coord(4));
    let out = args.get(5).map(PathBuf::from).unwrap_or(default_out);
    (image, face, out)
}

fn render(image: &RgbImage, face: FaceBox, effect: Effect, replacer: Option<Arc<BackgroundReplacer>>, out: &Path) {
    let mut morpher = FaceMorpher::from_image(image.clone())
        .face(face)
        .effect(effect)
        .format(OutputFormat::Png);
    let tag = match replacer {
        Some(r) => {
            morpher = morpher.background(r);
            "_mugshot"
        }
        None => "",
    };
    let result = morpher.process().unwrap();

    let filename = format!("{}{tag}.png", effect.id());
    std::fs::write(out.join(&filename), &result.data).unwrap();
    println!(
        "  {filename} ({width}x{height}, {size} bytes)",
        width = result.width,
        height = result.height,
        size = result.data.len(),
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (image, face, out) = load_input(&args);
    std::fs::create_dir_all(&out).expect("failed to create output directory");

    let replacer = Arc::new(BackgroundReplacer::new());
    for effect in Effect::ALL {
        println!("=== {} ===", effect.display_name());
        render(&image, face, effect, None, &out);
        render(&image, face, effect, Some(Arc::clone(&replacer)), &out);
    }

    let mask = facemorph::segment_person(&image, &face, replacer.config());
    mask.to_gray().save(out.join("matte.png")).unwrap();

    println!("Output written to {}", out.display());
}
