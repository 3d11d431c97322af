//! pcbtrace CLI - infer a component netlist from a PCB photograph.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pcbtrace::{
    load_detections, load_rgb_image, netlist_report, AnalysisResult, ArtifactPaths, ColorProfile,
    Detector, HostedDetector, HostedDetectorConfig, NoTextReader, PcbTraceCore, PipelineConfig,
    TileSlicer, TrackMaskExtractor,
};
use tracing_subscriber::EnvFilter;

const API_KEY_ENV: &str = "PCBTRACE_API_KEY";

#[derive(Parser)]
#[command(name = "pcbtrace")]
#[command(about = "PCB photo to netlist reverse engineering tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect components, trace copper and print the netlist
    Analyze {
        /// Board photograph (JPEG, PNG, ...)
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Directory for the report, mask, annotated image and JSON
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// JSON pipeline configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Saved detector response to use instead of calling the hosted model
        #[arg(long, value_name = "FILE")]
        detections: Option<PathBuf>,

        /// Hosted inference base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,

        /// Hosted model identifier
        #[arg(long, value_name = "ID")]
        model: Option<String>,

        /// Substrate colour profile (green, copper)
        #[arg(long)]
        profile: Option<ColorProfile>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Write the binary copper-track mask for an image
    Mask {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Output PNG path
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Substrate colour profile (green, copper)
        #[arg(long)]
        profile: Option<ColorProfile>,

        /// JSON pipeline configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print the inference tile plan for an image size
    Tiles {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// JSON pipeline configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable netlist report
    Human,
    /// JSON analysis summary
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Analyze {
            image,
            out,
            config,
            detections,
            api_url,
            model,
            profile,
            format,
        } => {
            let hosted = HostedOverrides { api_url, model };
            handle_analyze(&image, out.as_deref(), config.as_deref(), detections.as_deref(), hosted, profile, format)
                .await
        }
        Commands::Mask {
            image,
            out,
            profile,
            config,
        } => handle_mask(&image, &out, profile, config.as_deref()),
        Commands::Tiles {
            width,
            height,
            config,
        } => handle_tiles(width, height, config.as_deref()),
        Commands::Config => {
            println!("{}", PipelineConfig::default().to_json());
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>, profile: Option<ColorProfile>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(p) => PipelineConfig::from_file(p)
            .with_context(|| format!("loading configuration from {}", p.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(profile) = profile {
        config.tracks.profile = profile;
    }
    Ok(config)
}

struct HostedOverrides {
    api_url: Option<String>,
    model: Option<String>,
}

fn hosted_detector(overrides: HostedOverrides) -> Result<Arc<dyn Detector>> {
    let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
        anyhow!(
            "{} is not set; export it or pass --detections with a saved response",
            API_KEY_ENV
        )
    })?;
    let mut config = HostedDetectorConfig {
        api_key,
        ..Default::default()
    };
    if let Some(url) = overrides.api_url {
        config.api_url = url;
    }
    if let Some(model) = overrides.model {
        config.model_id = model;
    }
    Ok(Arc::new(HostedDetector::new(config)))
}

async fn handle_analyze(
    image_path: &Path,
    out: Option<&Path>,
    config: Option<&Path>,
    detections: Option<&Path>,
    hosted: HostedOverrides,
    profile: Option<ColorProfile>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config, profile)?;

    let result = match detections {
        Some(path) => {
            let raw = load_detections(path)
                .with_context(|| format!("reading detections from {}", path.display()))?;
            let image = load_rgb_image(image_path)?;
            let mut result =
                PcbTraceCore::analyze_with_detections(image, raw, &NoTextReader, &config).await?;
            result.source = Some(image_path.to_path_buf());
            result
        }
        None => {
            let detector = hosted_detector(hosted)?;
            PcbTraceCore::analyze(image_path, detector, &NoTextReader, &config).await?
        }
    };

    tracing::info!(
        "Run {} complete: {} components, {} connections",
        result.run_id,
        result.stats.components,
        result.stats.connections
    );
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    let artifacts = match out {
        Some(dir) => Some(result.write_artifacts(dir)?),
        None => None,
    };

    match format {
        OutputFormat::Human => output_human(&result, artifacts.as_ref()),
        OutputFormat::Json => output_json(&result, artifacts.as_ref())?,
    }
    Ok(())
}

fn output_human(result: &AnalysisResult, artifacts: Option<&ArtifactPaths>) {
    print!("{}", netlist_report(&result.graph));
    println!(
        "Tiles: {} ({} failed), raw detections: {}, track coverage: {:.1}%",
        result.stats.tiles,
        result.stats.failed_tiles,
        result.stats.raw_detections,
        result.stats.track_coverage * 100.0
    );
    if let Some(paths) = artifacts {
        println!("\nArtifacts:");
        println!("  Netlist:   {}", paths.netlist.display());
        println!("  Tracks:    {}", paths.tracks.display());
        println!("  Annotated: {}", paths.annotated.display());
        println!("  Analysis:  {}", paths.analysis.display());
    }
}

fn output_json(result: &AnalysisResult, artifacts: Option<&ArtifactPaths>) -> Result<()> {
    let mut output = serde_json::to_value(result.report())?;
    if let (Some(paths), Some(map)) = (artifacts, output.as_object_mut()) {
        map.insert("artifacts".to_string(), serde_json::to_value(paths)?);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_mask(
    image_path: &Path,
    out: &Path,
    profile: Option<ColorProfile>,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config, profile)?;
    config.validate()?;
    let mask = TrackMaskExtractor::from_config(&config.tracks).extract_from_path(image_path)?;
    mask.save(out)?;
    println!(
        "Track coverage: {:.4} ({:.1}%)",
        mask.coverage(),
        mask.coverage() * 100.0
    );
    println!("Mask written to {}", out.display());
    Ok(())
}

fn handle_tiles(width: u32, height: u32, config: Option<&Path>) -> Result<()> {
    let config = load_config(config, None)?;
    let tiles = TileSlicer::plan(width, height, &config.slicing);
    println!("{} tile(s) for {}x{}", tiles.len(), width, height);
    for (i, tile) in tiles.iter().enumerate() {
        println!(
            "  {:>3}: left={} top={} right={} bottom={}",
            i, tile.left, tile.top, tile.right, tile.bottom
        );
    }
    Ok(())
}
