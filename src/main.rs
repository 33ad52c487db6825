//! grainscan - blur-aware inspection of scattered small objects
//!
//! CLI entry point

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use grainscan::{exit_codes, CliOverrides, PipelineConfig, ScatterPipeline};

#[derive(Parser)]
#[command(name = "grainscan", version, about = "Blur-aware inspection of scattered small objects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: detect, classify, restore, annotate
    Analyze(AnalyzeArgs),

    /// Whole-image blur pre-check only (capture gating)
    Check(CheckArgs),

    /// Show version and environment information
    Info,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Input image file or directory of images
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-object Laplacian variance threshold
    #[arg(long)]
    laplacian_threshold: Option<f64>,

    /// Per-object Sobel magnitude threshold
    #[arg(long)]
    sobel_threshold: Option<f64>,

    /// Per-object pixel variance threshold
    #[arg(long)]
    variance_threshold: Option<f64>,

    /// Overlap ratio above which detections are merged
    #[arg(long)]
    overlap_threshold: Option<f64>,

    /// Richardson-Lucy iteration count
    #[arg(long)]
    rl_iterations: Option<u32>,

    /// Worker threads for batch processing
    #[arg(short, long)]
    threads: Option<usize>,

    /// Skip images whose outputs already exist
    #[arg(long)]
    skip_existing: bool,

    /// Print the execution plan without processing
    #[arg(long)]
    dry_run: bool,

    /// Verbose output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the summary
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Input image file
    input: PathBuf,

    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Check(args) => run_check(&args),
        Commands::Info => run_info(),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============ Analyze Command ============

fn run_analyze(args: &AnalyzeArgs) -> Result<i32> {
    init_tracing(args.verbose);
    let start_time = Instant::now();

    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let image_files = collect_image_files(&args.input)?;
    if image_files.is_empty() {
        eprintln!("Error: No image files found in input path");
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let config = load_config(args.config.as_deref()).merge_with_cli(&create_cli_overrides(args));

    if args.dry_run {
        print_execution_plan(args, &image_files, &config);
        return Ok(exit_codes::SUCCESS);
    }

    std::fs::create_dir_all(&args.output)?;

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
    }

    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(image_files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let pipeline = ScatterPipeline::new(config);

    // Images are independent; the per-image pipeline itself stays
    // single-threaded
    let results: Vec<(PathBuf, Result<String, String>)> = image_files
        .par_iter()
        .map(|path| {
            let outcome = process_one(&pipeline, path, &args.output, args.skip_existing);
            progress.inc(1);
            (path.clone(), outcome)
        })
        .collect();

    progress.finish_and_clear();

    let mut ok_count = 0usize;
    let mut skip_count = 0usize;
    let mut error_count = 0usize;

    for (path, result) in &results {
        match result {
            Ok(message) if message == "skipped" => {
                skip_count += 1;
                if args.verbose > 0 {
                    println!("Skipping (exists): {}", path.display());
                }
            }
            Ok(message) => {
                ok_count += 1;
                if !args.quiet {
                    println!("{}: {}", path.display(), message);
                }
            }
            Err(e) => {
                error_count += 1;
                eprintln!("Error processing {}: {}", path.display(), e);
            }
        }
    }

    if !args.quiet {
        println!();
        println!(
            "Processed: {} ok, {} skipped, {} failed ({:.2}s)",
            ok_count,
            skip_count,
            error_count,
            start_time.elapsed().as_secs_f64()
        );
    }

    if error_count > 0 {
        return Ok(exit_codes::GENERAL_ERROR);
    }
    Ok(exit_codes::SUCCESS)
}

/// Analyze one image and write restored image, annotated image, and report
fn process_one(
    pipeline: &ScatterPipeline,
    input: &Path,
    output_dir: &Path,
    skip_existing: bool,
) -> Result<String, String> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    let restored_path = output_dir.join(format!("{}_restored.png", stem));
    let annotated_path = output_dir.join(format!("{}_annotated.png", stem));
    let report_path = output_dir.join(format!("{}_report.json", stem));

    if skip_existing && restored_path.exists() && annotated_path.exists() && report_path.exists() {
        return Ok("skipped".to_string());
    }

    let image = image::open(input)
        .map_err(|e| format!("cannot decode: {}", e))?
        .to_rgb8();

    let outcome = pipeline.process(&image);

    outcome
        .restored_image
        .save(&restored_path)
        .map_err(|e| e.to_string())?;
    outcome
        .annotated_image
        .save(&annotated_path)
        .map_err(|e| e.to_string())?;

    let report = outcome.to_report();
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    std::fs::write(&report_path, json).map_err(|e| e.to_string())?;

    Ok(format!(
        "{} objects ({} blurred), {}",
        report.object_count, report.blurred_count, outcome.message
    ))
}

// ============ Check Command ============

fn run_check(args: &CheckArgs) -> Result<i32> {
    init_tracing(args.verbose);

    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let config = load_config(args.config.as_deref());
    let pipeline = ScatterPipeline::new(config);

    let image = image::open(&args.input)?.to_rgb8();
    let report = pipeline.check_image(&image);

    println!("Image: {}", args.input.display());
    println!("Verdict: {}", report.description);
    println!("  Blur score:         {:.2}", report.blur_score);
    println!("  Laplacian variance: {:.2}", report.laplacian_variance);
    println!("  Sobel magnitude:    {:.2}", report.sobel_mean_magnitude);
    println!("  Edge density:       {:.4}", report.edge_density);
    println!("  Pixel variance:     {:.2}", report.pixel_variance);

    if report.is_blurred {
        Ok(exit_codes::IMAGE_BLURRED)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

// ============ Info Command ============

fn run_info() -> Result<i32> {
    println!("grainscan v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Config File Locations:");
    for location in grainscan::config::config_locations() {
        println!("  {}", location.display());
    }

    Ok(exit_codes::SUCCESS)
}

// ============ Helper Functions ============

fn load_config(path: Option<&Path>) -> PipelineConfig {
    match path {
        Some(config_path) => match PipelineConfig::load_from_path(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::load().unwrap_or_default(),
    }
}

/// Only override config values the user explicitly set on the command line
fn create_cli_overrides(args: &AnalyzeArgs) -> CliOverrides {
    let mut overrides = CliOverrides::new();
    overrides.object_laplacian_threshold = args.laplacian_threshold;
    overrides.object_sobel_threshold = args.sobel_threshold;
    overrides.object_variance_threshold = args.variance_threshold;
    overrides.overlap_threshold = args.overlap_threshold;
    overrides.rl_iterations = args.rl_iterations;
    overrides.threads = args.threads;
    overrides
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Collect image files from input path (file or directory)
fn collect_image_files(input: &PathBuf) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    if input.is_file() {
        if is_image_file(input) {
            image_files.push(input.clone());
        }
    } else if input.is_dir() {
        for entry in std::fs::read_dir(input)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_image_file(&path) {
                image_files.push(path);
            }
        }
        image_files.sort();
    }

    Ok(image_files)
}

/// Print execution plan for dry-run mode
fn print_execution_plan(args: &AnalyzeArgs, image_files: &[PathBuf], config: &PipelineConfig) {
    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input: {}", args.input.display());
    println!("Output: {}", args.output.display());
    println!("Files to process: {}", image_files.len());
    println!();
    println!("Pipeline Configuration:");
    println!("  1. Candidate detection (contour / blob / watershed)");
    println!(
        "     Area ratio bounds: {} - {}",
        config.detection.min_area_ratio, config.detection.max_area_ratio
    );
    println!(
        "  2. Fusion (overlap threshold: {}, small-object threshold: {})",
        config.fusion.overlap_threshold, config.fusion.small_overlap_threshold
    );
    println!(
        "  3. Blur classification (Laplacian {}, Sobel {}, variance {})",
        config.classify.object_laplacian_threshold,
        config.classify.object_sobel_threshold,
        config.classify.object_variance_threshold
    );
    println!(
        "  4. Restoration (RL iterations: {}, NSR {} - {})",
        config.restore.rl_iterations, config.restore.nsr_min, config.restore.nsr_max
    );
    println!("  5. Shape classification and annotation");
    println!();
    println!("Processing Options:");
    println!(
        "  Threads: {}",
        config.threads.unwrap_or_else(num_cpus::get)
    );
    println!("  Skip existing: {}", if args.skip_existing { "YES" } else { "NO" });
    println!();
    println!("Files:");
    for (i, file) in image_files.iter().enumerate() {
        println!("  {}. {}", i + 1, file.display());
    }
}
