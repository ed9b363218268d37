//! Run one saved screenshot through landmark detection, calibration,
//! matching and decoding, and print what was read.
//! Usage: cargo run -p z1-vision --features cli --bin analyze_frame -- <frame.png> [data_dir]

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use z1_vision::{calibrate, decode, detect_landmarks, Calibration, CanonicalLandmarks, MatchingEngine, TemplateLibrary};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <frame.png> [data_dir]", args[0]);
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let data_dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data"));

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .to_rgba8();
    let (w, h) = (img.width(), img.height());
    println!("Image size: {}x{}", w, h);

    println!("\n=== Calibration ===");
    let calibration = match detect_landmarks(&img) {
        Some(landmarks) => {
            println!("{}", serde_json::to_string_pretty(&landmarks)?);
            match calibrate(&landmarks, &CanonicalLandmarks::default()) {
                Ok(cal) => cal,
                Err(e) => {
                    println!("Calibration rejected ({}), using identity", e);
                    Calibration::identity(w, h)
                }
            }
        }
        None => {
            println!("Landmarks NOT FOUND, using identity");
            Calibration::identity(w, h)
        }
    };
    println!("{}", serde_json::to_string_pretty(&calibration)?);

    println!("\n=== Matching ===");
    let library = TemplateLibrary::load(&data_dir)?;
    println!("Templates: {}", library.template_count());
    let engine = MatchingEngine::new(Arc::new(library), 1);
    let measurements = engine.measure(&img, &calibration);
    for tile in &measurements.tiles {
        println!(
            "  {:?}: {} ({:.3}) offset={:?}",
            tile.tile,
            tile.label.as_deref().unwrap_or("-"),
            tile.score,
            tile.offset
        );
    }
    println!(
        "Gameplay brightness {:.1}, status text {:.2}, reward gold {:.3}",
        measurements.regions.gameplay_brightness,
        measurements.regions.status_text_ratio,
        measurements.regions.reward_gold_ratio()
    );
    if let Some(room) = measurements.best_room() {
        println!("Best room: {} ({:.3})", room.room_id, room.score);
    }

    println!("\n=== Raw state ===");
    println!("{}", serde_json::to_string_pretty(&decode(&measurements))?);
    Ok(())
}
