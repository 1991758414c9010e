//! tinyimg CLI - PNG optimization tool
//!
//! A command-line interface for the tinyimg library.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tinyimg::api::{compress_options, optimize_options};
use tinyimg::{batch, report, AlphaPolicy, LossyOptions, Options};

/// Lossless and bounded-lossy PNG optimizer.
#[derive(Parser, Debug)]
#[command(name = "tinyimg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Show one line per file and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full-control lossless re-encode
    Optimize {
        #[command(flatten)]
        files: Files,

        /// Optimization preset (0-6, higher = slower and smaller)
        #[arg(short, long, default_value = "2", value_parser = clap::value_parser!(u8).range(0..=6))]
        level: u8,

        /// Keep ancillary chunks (only together with --preserve)
        #[arg(long)]
        keep_metadata: bool,

        /// Zero the color of fully transparent pixels
        #[arg(long)]
        alpha: bool,

        /// Write Adam7-interlaced output
        #[arg(long)]
        interlace: bool,

        /// Single fixed-filter trial instead of the search
        #[arg(long)]
        fast: bool,

        /// Keep metadata and the input's permissions and modification time
        #[arg(long)]
        preserve: bool,

        /// Budget per file in seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<f64>,

        /// Composite transparency over the background color (lossy)
        #[arg(long)]
        flatten: bool,
    },
    /// Simplified re-encode with optional color quantization
    Compress {
        #[command(flatten)]
        files: Files,

        /// Optimization preset (0-6, higher = slower and smaller)
        #[arg(short, long, default_value = "2", value_parser = clap::value_parser!(u8).range(0..=6))]
        level: u8,

        /// Zero the color of fully transparent pixels
        #[arg(long)]
        alpha: bool,

        /// Keep metadata and the input's permissions and modification time
        #[arg(long)]
        preserve: bool,

        /// Quantize colors (lossy)
        #[arg(long)]
        lossy: bool,

        /// Largest acceptable color difference for --lossy (CIE76 ΔE)
        #[arg(long, default_value = "2.3", value_name = "DELTA_E")]
        max_delta_e: f64,

        /// Floyd–Steinberg dithering for --lossy
        #[arg(long)]
        dither: bool,

        /// Composite transparency over the background color (lossy)
        #[arg(long)]
        flatten: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct Files {
    /// Input PNG files
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output file (single input only)
    #[arg(short, long, value_name = "OUTPUT", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Output directory; inputs are overwritten in place when neither this nor --output is given
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

impl Files {
    fn outputs(&self) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        if let Some(output) = &self.output {
            if self.inputs.len() != 1 {
                return Err("--output needs exactly one input; use --out-dir for several".into());
            }
            return Ok(vec![output.clone()]);
        }
        Ok(self
            .inputs
            .iter()
            .map(|input| match &self.out_dir {
                Some(dir) => dir.join(file_name(input)),
                None => input.clone(),
            })
            .collect())
    }
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map_or_else(|| path.to_path_buf(), PathBuf::from)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (files, options, preserve) = match cli.command {
        Command::Optimize {
            files,
            level,
            keep_metadata,
            alpha,
            interlace,
            fast,
            preserve,
            timeout,
            flatten,
        } => {
            let timeout = timeout
                .map(Duration::try_from_secs_f64)
                .transpose()
                .map_err(|e| format!("invalid --timeout: {e}"))?;
            let mut options =
                optimize_options(level, !keep_metadata, alpha, interlace, fast, preserve, timeout);
            apply_flatten(&mut options, flatten);
            options.verbose = cli.verbose;
            (files, options, preserve)
        }
        Command::Compress {
            files,
            level,
            alpha,
            preserve,
            lossy,
            max_delta_e,
            dither,
            flatten,
        } => {
            let mut options = compress_options(level, alpha, preserve, cli.verbose, lossy);
            if lossy {
                options.lossy = Some(LossyOptions {
                    max_delta_e,
                    dithering: dither,
                });
            }
            apply_flatten(&mut options, flatten);
            (files, options, preserve)
        }
    };

    let outputs = files.outputs()?;
    let start = Instant::now();
    let batch_report = batch::run(&files.inputs, &outputs, &options, preserve)?;
    let elapsed = start.elapsed();

    let (before, after) = batch_report.totals();
    if cli.verbose {
        for line in batch_report.lines() {
            println!("{line}");
        }
        eprintln!("  Files: {}", batch_report.files.len());
        eprintln!("  Time: {:.2?}", elapsed);
        eprintln!("  Total: {}", report::size_change(before, after));
    } else {
        println!("{}", report::size_change(before, after));
    }

    Ok(())
}

fn apply_flatten(options: &mut Options, flatten: bool) {
    if flatten {
        options.alpha = AlphaPolicy::Remove;
    }
}
