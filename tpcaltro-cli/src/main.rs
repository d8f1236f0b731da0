//!
//! Command-line interface for TPC ALTRO raw data processing: inspect and
//! decode raw blocks, run zero suppression, fit tail-cancellation-filter
//! parameters, and validate them.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use tpcaltro_calib::{
    calibrate_batch, evaluate_record, AccumulatorConfig, PulseAccumulator, PulseHistogram,
    TcfRecord,
};
use tpcaltro_core::Digit;
use tpcaltro_io::{JsonLinesWriter, RawEventFile, RunDescription};
use tpcaltro_raw::DecoderConfig;
use tpcaltro_zs::{ZeroSuppressionEngine, ZsConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    TpcaltroIo(#[from] tpcaltro_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] tpcaltro_core::Error),

    #[error("Raw data error: {0}")]
    Raw(#[from] tpcaltro_raw::Error),

    #[error("Zero suppression error: {0}")]
    Zs(#[from] tpcaltro_zs::Error),

    #[error("Calibration error: {0}")]
    Calib(#[from] tpcaltro_calib::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// TPC ALTRO raw data processor.
#[derive(Parser)]
#[command(name = "tpcaltro")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show decode statistics for a raw block file
    Info {
        /// Input raw DDL payload file
        input: PathBuf,

        /// TPC slice the block came from
        #[arg(long)]
        slice: u8,

        /// Readout partition the block came from
        #[arg(long)]
        partition: u8,

        /// The block carries the legacy single-word RCU trailer
        #[arg(long)]
        oldrcuformat: bool,
    },

    /// Decode a raw block file and print its digits
    Decode {
        /// Input raw DDL payload file
        input: PathBuf,

        /// TPC slice the block came from
        #[arg(long)]
        slice: u8,

        /// Readout partition the block came from
        #[arg(long)]
        partition: u8,

        /// The block carries the legacy single-word RCU trailer
        #[arg(long)]
        oldrcuformat: bool,

        /// Deliver digits sorted by (row, pad, time)
        #[arg(long)]
        sort: bool,

        /// Time bins per channel
        #[arg(long, default_value = "1024")]
        ntimebins: u16,

        /// Print at most this many digits (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Zero-suppress a raw block file
    ZeroSuppress {
        /// Input raw DDL payload file
        input: PathBuf,

        /// Output file for the suppressed block
        #[arg(short, long)]
        output: PathBuf,

        /// TPC slice the block came from
        #[arg(long)]
        slice: u8,

        /// Readout partition the block came from
        #[arg(long)]
        partition: u8,

        /// Engine options as a `key value` string, e.g.
        /// "signal-threshold 5 occupancy-limit 2"
        #[arg(long, default_value = "")]
        options: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Fit tail-cancellation-filter parameters from calibration pulses
    FitTcf {
        /// Run description JSON listing the raw files
        run: PathBuf,

        /// Output JSON-lines file for the fitted records
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum peak ADC for a pulse to qualify
        #[arg(long, default_value = "50")]
        threshold: u16,

        /// Merge all pads of a sector into one fit
        #[arg(long)]
        per_sector: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate fitted filter records against the calibration pulses
    ValidateTcf {
        /// Run description JSON listing the raw files
        run: PathBuf,

        /// Fitted records from `fit-tcf`
        #[arg(long)]
        records: PathBuf,

        /// Output JSON-lines file for the quality records
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum peak ADC for a pulse to qualify
        #[arg(long, default_value = "50")]
        threshold: u16,
    },
}

fn main() {
    env_logger::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Info {
            input,
            slice,
            partition,
            oldrcuformat,
        } => {
            let file = RawEventFile::open(&input, slice, partition)?;
            let config = DecoderConfig::default().with_old_rcu_format(oldrcuformat);
            let decoded = file.decode(&config)?;
            let stats = decoded.stats;
            println!("file:               {}", input.display());
            println!("slice/partition:    {}/{}", slice, partition);
            println!("channels:           {}", stats.channels);
            println!("bunches:            {}", stats.bunches);
            println!("samples:            {}", stats.samples);
            println!("malformed channels: {}", stats.malformed_channels);
            println!("unmapped channels:  {}", stats.unmapped_channels);
            Ok(())
        }

        Commands::Decode {
            input,
            slice,
            partition,
            oldrcuformat,
            sort,
            ntimebins,
            limit,
        } => {
            let file = RawEventFile::open(&input, slice, partition)?;
            let config = DecoderConfig::default()
                .with_old_rcu_format(oldrcuformat)
                .with_unsorted(!sort)
                .with_n_time_bins(ntimebins);
            let decoded = file.decode(&config)?;
            let shown = if limit == 0 {
                decoded.digits.len()
            } else {
                limit.min(decoded.digits.len())
            };
            for digit in &decoded.digits[..shown] {
                println!(
                    "row {:3} pad {:3} time {:4} adc {:4}",
                    digit.row, digit.pad, digit.time, digit.adc
                );
            }
            if shown < decoded.digits.len() {
                eprintln!("... {} more digits", decoded.digits.len() - shown);
            }
            Ok(())
        }

        Commands::ZeroSuppress {
            input,
            output,
            slice,
            partition,
            options,
            verbose,
        } => {
            let config = ZsConfig::from_options(&options)?;
            let file = RawEventFile::open(&input, slice, partition)?;
            let mut engine = ZeroSuppressionEngine::new(config)?;

            // The suppressed block can never outgrow the input block.
            let mut buffer = vec![0u8; file.bytes().len().max(64)];
            let result = engine.suppress_block(file.bytes(), file.descriptor(), &mut buffer)?;

            fs::write(&output, &buffer[..result.payload_len])?;
            let address_path = output.with_extension("hwaddr");
            fs::write(&address_path, result.hw_address_bytes())?;

            if verbose {
                let stats = result.stats;
                eprintln!("pads seen:     {}", stats.pads_seen);
                eprintln!("pads kept:     {}", stats.pads_kept);
                eprintln!("samples seen:  {}", stats.samples_seen);
                eprintln!("samples kept:  {}", stats.samples_kept);
                eprintln!("payload bytes: {}", result.payload_len);
                eprintln!("address list:  {}", address_path.display());
            }
            Ok(())
        }

        Commands::FitTcf {
            run,
            output,
            threshold,
            per_sector,
            verbose,
        } => {
            let histograms = accumulate_run(&run, threshold, per_sector)?;
            if verbose {
                eprintln!("accumulated {} histograms", histograms.len());
            }
            let records = calibrate_batch(&histograms);
            let mut writer = JsonLinesWriter::create(&output)?;
            for record in &records {
                writer.write(record)?;
            }
            let written = writer.finish()?;
            if verbose {
                eprintln!(
                    "fitted {written} of {} histograms -> {}",
                    histograms.len(),
                    output.display()
                );
            }
            Ok(())
        }

        Commands::ValidateTcf {
            run,
            records,
            output,
            threshold,
        } => {
            let histograms = accumulate_run(&run, threshold, false)?;
            let by_pad: HashMap<(u8, u16, u16), &PulseHistogram> = histograms
                .iter()
                .map(|h| ((h.sector, h.row, h.pad), h))
                .collect();

            let mut writer = JsonLinesWriter::create(&output)?;
            for line in fs::read_to_string(&records)?.lines() {
                let record: TcfRecord = serde_json::from_str(line)?;
                let Some(histogram) = by_pad.get(&(record.sector, record.row, record.pad))
                else {
                    log::warn!(
                        "no pulses for sector {} row {} pad {}, skipping",
                        record.sector,
                        record.row,
                        record.pad
                    );
                    continue;
                };
                let mean = histogram.mean_pulse()?;
                writer.write(&evaluate_record(&mean, &record))?;
            }
            writer.finish()?;
            Ok(())
        }
    }
}

/// Decodes every file of a run and accumulates calibration pulses per pad.
fn accumulate_run(
    run: &PathBuf,
    threshold: u16,
    per_sector: bool,
) -> Result<Vec<PulseHistogram>> {
    let description = RunDescription::from_file(run)?;
    let config = AccumulatorConfig {
        qualification_threshold: threshold,
        ..AccumulatorConfig::default()
    };
    let mut accumulator = PulseAccumulator::new(config)?;

    for entry in &description.files {
        let file = RawEventFile::open(&entry.path, entry.slice, entry.partition)?;
        let decoded = file.decode(&DecoderConfig::default())?;

        let mut per_pad: HashMap<(u16, u16), Vec<Digit>> = HashMap::new();
        for digit in decoded.digits {
            per_pad.entry((digit.row, digit.pad)).or_default().push(digit);
        }
        for ((row, pad), digits) in per_pad {
            accumulator.add_pad_event(entry.slice, row, pad, &digits);
        }
    }

    Ok(if per_sector {
        accumulator.merge_by_sector()
    } else {
        accumulator.into_histograms()
    })
}
