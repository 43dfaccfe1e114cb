use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use env_logger::Env;
use odbpp::{ExtractOptions, FlipOptions, PlacementExportMode, Unit, extract};

#[derive(Parser)]
#[command(name = "odbpp-extract")]
#[command(about = "Extract component placements from ODB++ jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a .tgz/.tar.gz ODB++ archive or an extracted job directory
    input: PathBuf,

    /// Directory where XML reports are written
    #[arg(long = "out", value_name = "DIR", default_value = "reports")]
    out: PathBuf,

    /// Coordinate origin(s) for placement reports
    #[arg(long, value_enum, default_value = "both")]
    origin: OriginArg,

    /// Write one placement report per layer
    #[arg(long = "separate-layers")]
    separate_layers: bool,

    /// Only export the named component layers (repeatable)
    #[arg(long = "layer", value_name = "NAME")]
    layers: Vec<String>,

    /// Convert placement coordinates and dimensions to this unit
    #[arg(long, value_enum)]
    unit: Option<UnitArg>,

    /// Mirror placement X coordinates about the origin
    #[arg(long = "flip-x")]
    flip_x: bool,

    /// Mirror placement Y coordinates about the origin
    #[arg(long = "flip-y")]
    flip_y: bool,

    /// Apply the requested flips to *_BOT layers only
    #[arg(long = "flip-bottom-only")]
    flip_bottom_only: bool,

    /// Skip the job-wide report
    #[arg(long = "no-job-report")]
    no_job_report: bool,

    /// Directory for temporary archive extraction
    #[arg(long = "work-dir", value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OriginArg {
    BottomLeft,
    TopLeft,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UnitArg {
    Inch,
    Mm,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let flip = (cli.flip_x || cli.flip_y).then_some(FlipOptions {
        flip_x: cli.flip_x,
        flip_y: cli.flip_y,
        bottom_layers_only: cli.flip_bottom_only,
    });

    let options = ExtractOptions {
        export_job_report: !cli.no_job_report,
        placement_mode: match cli.origin {
            OriginArg::BottomLeft => PlacementExportMode::BottomLeft,
            OriginArg::TopLeft => PlacementExportMode::TopLeft,
            OriginArg::Both => PlacementExportMode::Both,
            OriginArg::None => PlacementExportMode::None,
        },
        separate_by_layer: cli.separate_layers,
        layer_filter: (!cli.layers.is_empty()).then(|| cli.layers.clone()),
        target_unit: cli.unit.map(|unit| match unit {
            UnitArg::Inch => Unit::Inch,
            UnitArg::Mm => Unit::Mm,
        }),
        flip,
        report_dir: cli.out.clone(),
        work_dir: cli.work_dir.clone(),
    };

    let extraction = extract(&cli.input, &options)?;

    println!(
        "{} extracted {} step(s) from {}",
        "ok:".green().bold(),
        extraction.job.steps.len(),
        cli.input.display()
    );
    if let Some(path) = &extraction.job_report_path {
        println!("  job report: {}", path.display());
    }
    for path in &extraction.placement_report_paths {
        println!("  components (bottom-left): {}", path.display());
    }
    for path in &extraction.top_left_placement_report_paths {
        println!("  components (top-left): {}", path.display());
    }
    Ok(())
}
