//! Receive timing benchmark for SoapySDR devices
//!
//! Lists the available devices, opens one, prints its receive capabilities,
//! then times `--iterations` rounds of block reads (and optionally a forward
//! FFT over the acquired buffer).
//!
//! # Usage Examples
//!
//! ## First device, default settings (16 MS/s at 433 MHz, no FFT)
//! ```bash
//! rxbench
//! ```
//!
//! ## HackRF, 1 Mi-sample blocks, 6-thread FFT
//! ```bash
//! rxbench --args driver=hackrf -s 16M -c 433M --fft --threads 6 -v
//! ```

use std::process::ExitCode;
use std::str::FromStr;

use clap::{ArgAction, Parser};
use rxbench::device::DeviceSelection;
use rxbench::{BenchConfig, Gain, PlanEffort};
use tracing::error;

/// Frequency in Hz, parsed from plain numbers or k/M/G suffixes
#[derive(Debug, Clone, Copy)]
struct Frequency(f64);

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, scale) = if let Some(stripped) = s.strip_suffix('G') {
            (stripped, 1e9)
        } else if let Some(stripped) = s.strip_suffix('M') {
            (stripped, 1e6)
        } else if let Some(stripped) = s.strip_suffix('k') {
            (stripped, 1e3)
        } else {
            (s, 1.0)
        };
        let val: f64 = digits
            .trim()
            .parse()
            .map_err(|_| format!("Invalid frequency: {}", s))?;
        if !(val.is_finite() && val > 0.0) {
            return Err(format!("Frequency must be positive: {}", s));
        }
        Ok(Frequency(val * scale))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive and FFT timing benchmark for SoapySDR devices", long_about = None)]
struct Args {
    /// Device discovery filter (e.g. "driver=rtlsdr")
    #[arg(long, default_value = "")]
    args: String,

    /// Index of the discovered device to open
    #[arg(short, long, default_value_t = 0)]
    device_index: usize,

    /// Sample rate in Hz (accepts k/M suffix, e.g. 2.4M)
    #[arg(short, long, default_value = "16M", value_parser = Frequency::from_str)]
    sample_rate: Frequency,

    /// Center frequency in Hz (accepts k/M/G suffix, e.g. 433M)
    #[arg(short, long, default_value = "433M", value_parser = Frequency::from_str)]
    center_freq: Frequency,

    /// Tuner gain in dB (None leaves the device default)
    #[arg(short, long, default_value = None, allow_hyphen_values = true)]
    gain: Option<f64>,

    /// Receive channel
    #[arg(long, default_value_t = 0)]
    channel: usize,

    /// Samples per read
    #[arg(short, long, default_value_t = 8 * 128 * 1024)]
    block_size: usize,

    /// Blocks acquired per iteration
    #[arg(short, long, default_value_t = 1)]
    multiplier: usize,

    /// Number of timed iterations
    #[arg(short = 'n', long, default_value_t = 30)]
    iterations: usize,

    /// FFT worker threads
    #[arg(short, long, default_value_t = 6)]
    threads: usize,

    /// Read timeout in microseconds
    #[arg(long, default_value_t = 2_000_000)]
    timeout_us: i64,

    /// Run a forward FFT over each acquired buffer
    #[arg(long, default_value_t = false)]
    fft: bool,

    /// Plan the FFT heuristically instead of timing the candidates
    #[arg(long, default_value_t = false)]
    estimate: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> BenchConfig {
        BenchConfig {
            channel: self.channel,
            sample_rate: self.sample_rate.0,
            center_freq: self.center_freq.0,
            gain: match self.gain {
                Some(g) => Gain::Manual(g),
                None => Gain::Auto,
            },
            block_size: self.block_size,
            multiplier: self.multiplier,
            iterations: self.iterations,
            threads: self.threads,
            timeout_us: self.timeout_us,
            fft: self.fft,
            effort: if self.estimate {
                PlanEffort::Estimate
            } else {
                PlanEffort::Measure
            },
        }
    }

    fn selection(&self) -> DeviceSelection {
        DeviceSelection {
            filter: self.args.clone(),
            index: self.device_index,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    match bench(&args) {
        Ok(()) => {
            println!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "soapy")]
fn bench(args: &Args) -> rxbench::Result<()> {
    let driver = rxbench::soapy::SoapyDriver;
    let mut out = std::io::stdout().lock();
    let report = rxbench::run(&driver, &args.selection(), &args.config(), &mut out)?;
    report.write_summary(&mut out)?;
    Ok(())
}

#[cfg(not(feature = "soapy"))]
fn bench(args: &Args) -> rxbench::Result<()> {
    args.config().validate()?;
    Err(rxbench::Error::other(format!(
        "cannot open {:?}: soapy feature not enabled. Rebuild with --features soapy",
        args.selection()
    )))
}
