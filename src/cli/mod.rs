//! Command-line interface for the microscopy container tool.
//!
//! Image records are read from the JSON documents produced by the external
//! metadata parser.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::composite::{render_preview, ContrastStretch, MinMaxStretch, NamedColors, NoStretch};
use crate::config::{AppConfig, OutputConfig, SampleStrategy};
use crate::container::ContainerIndex;
use crate::convert::{Converter, UnsupportedEncoder};
use crate::error::MicroImgError;
use crate::extract::PlaneRequest;
use crate::metadata::MetadataRecord;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::router::route;
use crate::stats::sample;
use crate::writer::SubContainerWriter;

/// Microscopy container tool
///
/// Inspects LIF containers, previews planes, samples intensities and
/// extracts single images into standalone containers.
#[derive(Parser, Debug)]
#[command(name = "microimg")]
#[command(version)]
#[command(about = "Plane extraction and single-image export for LIF/LOF/XLEF containers")]
#[command(long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the memory blocks of a container file
    Info {
        /// Container (.lif) file
        input: PathBuf,

        /// Also print the header XML
        #[arg(long)]
        xml: bool,
    },

    /// Show the output strategy chosen for an image
    Route {
        /// Image record (JSON)
        metadata: PathBuf,
    },

    /// Estimate per-channel intensity ranges
    Stats {
        /// Image record (JSON)
        metadata: PathBuf,

        /// Fraction of rows to read
        #[arg(long)]
        fraction: Option<f64>,

        /// Row read strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Render a composited plane to PNG
    Preview {
        /// Image record (JSON)
        metadata: PathBuf,

        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,

        /// Z position
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        z: i64,

        /// Time point
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        t: i64,

        /// Tile
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        tile: i64,

        /// Output height in pixels (0 = stored height)
        #[arg(long)]
        height: Option<u32>,

        /// Channel mask, e.g. "1,0,1"
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<u8>>,

        /// Contrast stretch
        #[arg(long, value_enum, default_value = "minmax")]
        stretch: StretchArg,
    },

    /// Write one image as a standalone container
    Extract {
        /// Image record (JSON) with an element descriptor
        metadata: PathBuf,

        /// Output folder (default: next to the source)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Secondary folder receiving a copy
        #[arg(long)]
        alt_dir: Option<PathBuf>,
    },

    /// Route an image and execute the chosen strategy
    Convert {
        /// Image record (JSON)
        metadata: PathBuf,

        /// Output folder (default: next to the source)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Secondary folder receiving a copy
        #[arg(long)]
        alt_dir: Option<PathBuf>,
    },
}

/// Sampler read strategy argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    /// Memory-mapped plane
    Mapped,
    /// One seek per sampled row
    Seek,
}

impl From<StrategyArg> for SampleStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Mapped => SampleStrategy::Mapped,
            StrategyArg::Seek => SampleStrategy::Seek,
        }
    }
}

/// Contrast stretch argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StretchArg {
    /// Leave intensities as composited
    None,
    /// Stretch each component to the full range
    Minmax,
}

/// Run the CLI application.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else if !cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Info { input, xml } => run_info(&input, xml, cli.quiet),
        Commands::Route { metadata } => {
            let record = load_record(&metadata)?;
            println!("{}", route(&record, &config.router));
            Ok(())
        }
        Commands::Stats {
            metadata,
            fraction,
            strategy,
        } => {
            let record = load_record(&metadata)?;
            let mut sampler = config.sampler;
            if let Some(fraction) = fraction {
                sampler.sample_fraction = fraction;
            }
            if let Some(strategy) = strategy {
                sampler.strategy = strategy.into();
            }
            let stats = sample(&record, &sampler);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Preview {
            metadata,
            output,
            z,
            t,
            tile,
            height,
            channels,
            stretch,
        } => {
            let record = load_record(&metadata)?;
            let mut request =
                PlaneRequest::new(z, t, tile, height.unwrap_or(config.extract.preview_height));
            if let Some(mask) = channels {
                request = request.with_mask(mask.into_iter().map(|m| m != 0).collect());
            }
            run_preview(&record, &request, stretch, &output, cli.quiet)
        }
        Commands::Extract {
            metadata,
            output_dir,
            alt_dir,
        } => {
            let record = load_record(&metadata)?;
            let output = output_config(output_dir, alt_dir);
            let progress = BarProgress::new(cli.quiet);
            let outcome = SubContainerWriter::new(config.writer)
                .write_single_image(&record, &output, &progress)
                .with_context(|| format!("extracting {:?}", record.name))?;
            progress.finish();
            if !cli.quiet {
                println!("{}", outcome.path.display());
            }
            Ok(())
        }
        Commands::Convert {
            metadata,
            output_dir,
            alt_dir,
        } => {
            let record = load_record(&metadata)?;
            let output = output_config(output_dir, alt_dir);
            let converter = Converter::new(config.router, config.writer, UnsupportedEncoder);
            let progress = BarProgress::new(cli.quiet);
            let result = converter
                .convert(&record, &output, &progress)
                .with_context(|| format!("converting {:?}", record.name))?;
            progress.finish();
            println!("{}", serde_json::to_string_pretty(&[result])?);
            Ok(())
        }
    }
}

fn load_record(path: &Path) -> anyhow::Result<MetadataRecord> {
    MetadataRecord::from_json_file(path)
        .with_context(|| format!("reading image record {}", path.display()))
}

fn output_config(output_dir: Option<PathBuf>, alt_dir: Option<PathBuf>) -> OutputConfig {
    OutputConfig {
        output_dir,
        alt_output_dir: alt_dir,
    }
}

fn run_info(input: &Path, xml: bool, quiet: bool) -> anyhow::Result<()> {
    let index = ContainerIndex::open(input)
        .with_context(|| format!("opening container {}", input.display()))?;
    if quiet {
        return Ok(());
    }

    println!("Container: {}", index.path().display());
    println!("Header XML: {} characters", index.xml().chars().count());
    println!("Memory blocks: {}", index.blocks().len());
    for block in index.blocks() {
        println!(
            "  {:<20} {:>14} bytes at offset {}",
            block.block_id, block.memory_size, block.position
        );
    }
    if xml {
        println!();
        println!("{}", index.xml());
    }
    Ok(())
}

fn run_preview(
    record: &MetadataRecord,
    request: &PlaneRequest,
    stretch: StretchArg,
    output: &Path,
    quiet: bool,
) -> anyhow::Result<()> {
    let stretch: &dyn ContrastStretch = match stretch {
        StretchArg::None => &NoStretch,
        StretchArg::Minmax => &MinMaxStretch,
    };
    let Some(image) = render_preview(record, request, &NamedColors, stretch) else {
        bail!("image {:?} is unavailable", record.name);
    };
    image
        .to_rgb8()
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    if !quiet {
        println!(
            "{} ({}x{})",
            output.display(),
            image.width,
            image.height
        );
    }
    Ok(())
}

/// Terminal progress bar for writes and conversions.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(100)
        };
        let style = ProgressStyle::with_template("{wide_bar:0.white/dim.white} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("██▁"));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.set_position(event.percent as u64);
        self.bar.set_message(event.message.clone());
    }

    fn on_error(&self, error: &MicroImgError, _file: Option<&Path>) {
        self.bar.abandon_with_message(format!("failed: {}", error));
    }
}
