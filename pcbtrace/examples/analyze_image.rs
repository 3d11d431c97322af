//! Analyze a board photo with a saved detector response and print the netlist.

use pcbtrace::prelude::*;
use pcbtrace::{load_detections, load_rgb_image, netlist_report};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), PcbTraceError> {
    let mut args = std::env::args().skip(1);
    let (Some(image_path), Some(detections_path)) = (args.next(), args.next()) else {
        eprintln!("Usage: cargo run --example analyze_image <board.jpg> <predictions.json> [out_dir]");
        std::process::exit(1);
    };
    let out_dir = args.next();

    let image = load_rgb_image(Path::new(&image_path))?;
    let detections = load_detections(Path::new(&detections_path))?;
    let config = PipelineConfig::default();

    let result = PcbTraceCore::analyze_with_detections(image, detections, &NoTextReader, &config).await?;

    print!("{}", netlist_report(&result.graph));
    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }

    if let Some(dir) = out_dir {
        let paths = result.write_artifacts(Path::new(&dir))?;
        println!("Report written to {}", paths.netlist.display());
    }

    Ok(())
}
