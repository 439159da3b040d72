//! Commandline utility to compute seed-based connectivity maps from nifti files.
//!
//! `refvox` correlates every voxel with the mean series of a reference ROI,
//! `seedmap` with a seed-map weighted series inside a stimulus ROI, and `com`
//! prints the center of mass of a cluster image in mm.

use clap::{Parser, Subcommand};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use contarg::error::{ContargError, Result};
use contarg::masker::DEFAULT_SMOOTHING_FWHM;
use contarg::{
    center_of_mass_mm, reference_voxel_connectivity_from_paths,
    seedmap_voxel_connectivity_from_paths, Image,
};

// use clap to create commandline interface
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connectivity of every voxel with the mean time series of a reference ROI.
    Refvox {
        /// functional runs, concatenated in the order given. Glob patterns are expanded.
        #[arg(short, long, required = true, num_args = 1..)]
        bold: Vec<String>,

        /// whole-brain mask
        #[arg(short, long)]
        mask: PathBuf,

        /// reference ROI
        #[arg(short, long)]
        refroi: PathBuf,

        /// repetition time in seconds
        #[arg(short, long)]
        tr: f64,

        /// FWHM in mm of the spatial smoothing kernel
        #[arg(short, long, default_value_t = DEFAULT_SMOOTHING_FWHM)]
        smoothing_fwhm: f64,

        /// the name of the output nifti file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Connectivity of stimulus ROI voxels with a seed-map weighted time series.
    Seedmap {
        /// functional runs, concatenated in the order given. Glob patterns are expanded.
        #[arg(short, long, required = true, num_args = 1..)]
        bold: Vec<String>,

        /// whole-brain mask
        #[arg(short, long)]
        mask: PathBuf,

        /// seed map giving each voxel its weight
        #[arg(long)]
        seedmap: PathBuf,

        /// stimulus ROI; its voxels carry no seed weight and are the only ones mapped
        #[arg(long)]
        stimroi: PathBuf,

        /// number of leading volumes dropped from each cleaned run
        #[arg(short, long, default_value_t = 0)]
        n_dummy: usize,

        /// repetition time in seconds
        #[arg(short, long)]
        tr: f64,

        /// FWHM in mm of the spatial smoothing kernel
        #[arg(long, default_value_t = DEFAULT_SMOOTHING_FWHM)]
        smoothing_fwhm: f64,

        /// the name of the output nifti file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the center of mass (mm) of the non-zero voxels of an image.
    Com {
        /// the input nifti file
        #[arg(short, long)]
        input: PathBuf,
    },
}

/// Expands each argument as a glob pattern, keeping the argument order.
///
/// Matches of a single pattern are sorted by path. An argument without
/// matches is kept as a literal path so that the loader reports it. A match
/// that cannot be read is an error.
fn expand_runs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut runs = Vec::new();
    for pattern in patterns {
        let mut matches = glob(pattern)?.collect::<std::result::Result<Vec<PathBuf>, _>>()?;
        if matches.is_empty() {
            runs.push(PathBuf::from(pattern));
        } else {
            matches.sort();
            runs.append(&mut matches);
        }
    }
    Ok(runs)
}

fn check_output(output: &Path) {
    if output.exists() {
        eprintln!("Error! Output file already exists. Please specify a different output file or remove existing file.");
        std::process::exit(-2);
    }
}

fn smoothing(fwhm: f64) -> Option<f64> {
    if fwhm > 0.0 {
        Some(fwhm)
    } else {
        None
    }
}

fn run(cli: Args) -> Result<()> {
    match cli.command {
        Command::Refvox {
            bold,
            mask,
            refroi,
            tr,
            smoothing_fwhm,
            output,
        } => {
            check_output(&output);
            let runs = expand_runs(&bold)?;
            info!("Computing reference ROI connectivity over {} runs", runs.len());
            reference_voxel_connectivity_from_paths(
                &runs,
                &mask,
                &refroi,
                tr,
                smoothing(smoothing_fwhm),
                Some(output.as_path()),
            )?;
        }
        Command::Seedmap {
            bold,
            mask,
            seedmap,
            stimroi,
            n_dummy,
            tr,
            smoothing_fwhm,
            output,
        } => {
            check_output(&output);
            let runs = expand_runs(&bold)?;
            info!("Computing seed-map connectivity over {} runs", runs.len());
            seedmap_voxel_connectivity_from_paths(
                &runs,
                &mask,
                &seedmap,
                &stimroi,
                n_dummy,
                tr,
                smoothing(smoothing_fwhm),
                Some(output.as_path()),
            )?;
        }
        Command::Com { input } => {
            let img = Image::load(&input)?;
            let com = center_of_mass_mm(&img)?;
            println!("{:.4} {:.4} {:.4}", com[0], com[1], com[2]);
        }
    }
    Ok(())
}

// main function parses commandline arguments and runs the program
fn main() {
    let cli = Args::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error! {}", e);
        std::process::exit(-2);
    }

    run(cli).unwrap_or_else(|e: ContargError| {
        eprintln!("Error! {}", e);
        std::process::exit(-2);
    });
}
