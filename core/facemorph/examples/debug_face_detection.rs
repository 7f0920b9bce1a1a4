//! Run the SeetaFace detector over images and save annotated copies.
//!
//! Usage:
//!   cargo run --example debug_face_detection --features rustface -- <model.bin> <image>...
//!
//! Annotated images are written next to each input as `<stem>_faces.png`.

use std::path::Path;

use facemorph::{annotate_faces, best_face, detect_faces, locate_landmarks, RustfaceDetector};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((model_path, images)) = args.split_first() else {
        eprintln!("usage: debug_face_detection <model.bin> <image>...");
        std::process::exit(2);
    };
    let detector = RustfaceDetector::from_path(model_path)
        .expect("failed to load model")
        .min_face_size(20);

    for input_path in images {
        let input = std::fs::read(input_path).unwrap_or_else(|e| panic!("failed to read {input_path}: {e}"));
        let image = image::load_from_memory(&input).unwrap().to_rgb8();
        let (width, height) = image.dimensions();
        println!("=== {input_path} ({width}x{height}) ===");

        let faces = detect_faces(&image, &detector);
        if faces.is_empty() {
            println!("  NO FACES DETECTED");
            continue;
        }

        println!("  Found {} face(s):", faces.len());
        for (i, face) in faces.iter().enumerate() {
            let b = face.bbox;
            println!(
                "    face {i}: score={:.2}, bbox=({}, {}, {}x{})",
                face.confidence,
                b.x1,
                b.y1,
                b.width(),
                b.height(),
            );
        }

        if let Some(best) = best_face(&faces) {
            let landmarks = locate_landmarks(None, &image, &best.bbox);
            println!(
                "  → estimated face center {:?}, radius {}px",
                landmarks.face_center(),
                landmarks.face_radius()
            );
        }

        let path = Path::new(input_path);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
        let out = path.with_file_name(format!("{stem}_faces.png"));
        annotate_faces(&image, &faces).save(&out).unwrap();
        println!("  → {}", out.display());
        println!();
    }
}
