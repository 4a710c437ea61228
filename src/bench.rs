//! Acquisition benchmark
//!
//! Discovery, configuration and the timed read/transform loop. The loop reads
//! `multiplier` blocks of `block_size` samples into consecutive regions of
//! one preallocated buffer, optionally runs the transform over the whole
//! buffer, and records the two durations separately so they can be compared
//! against the real-time budget `N / sample_rate`.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::device::{self, DeviceSelection, Direction, FrequencyRange, RadioDevice, RadioDriver};
use crate::error::{self, Error};
use crate::fft::{PlanEffort, SampleBuffer, TransformPlan};
use crate::{Gain, stream};

/**
 * Benchmark configuration
 */
#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Receive channel index (typically 0)
    pub channel: usize,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Center frequency in Hz
    pub center_freq: f64,
    /// Tuner gain (Auto leaves the device default)
    pub gain: Gain,
    /// Samples requested per read
    pub block_size: usize,
    /// Blocks per iteration; the buffer holds `multiplier × block_size` samples
    pub multiplier: usize,
    /// Number of timed iterations
    pub iterations: usize,
    /// Worker threads for the transform
    pub threads: usize,
    /// Read timeout in microseconds
    pub timeout_us: i64,
    /// Run the transform after each acquisition
    pub fft: bool,
    /// Transform planning effort
    pub effort: PlanEffort,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            sample_rate: 16e6,
            center_freq: 433e6,
            gain: Gain::Auto,
            block_size: 8 * 128 * 1024,
            multiplier: 1,
            iterations: 30,
            threads: 6,
            timeout_us: 2_000_000,
            fft: false,
            effort: PlanEffort::Measure,
        }
    }
}

impl BenchConfig {
    /// Total samples per iteration
    ///
    /// Saturates on overflow; `validate` rejects such configurations.
    pub fn buffer_len(&self) -> usize {
        self.multiplier.saturating_mul(self.block_size)
    }

    /// Time the radio takes to produce one block
    pub fn block_duration(&self) -> Duration {
        sample_time(self.block_size, self.sample_rate)
    }

    /// Time the radio takes to fill the whole buffer
    pub fn realtime_budget(&self) -> Duration {
        sample_time(self.buffer_len(), self.sample_rate)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.block_size == 0 {
            return Err(Error::config("block size must be positive"));
        }
        if self.multiplier == 0 {
            return Err(Error::config("multiplier must be positive"));
        }
        if self.iterations == 0 {
            return Err(Error::config("iteration count must be positive"));
        }
        if self.threads == 0 {
            return Err(Error::config("thread count must be positive"));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::config(format!(
                "invalid sample rate {} Hz",
                self.sample_rate
            )));
        }
        if !(self.center_freq.is_finite() && self.center_freq > 0.0) {
            return Err(Error::config(format!(
                "invalid center frequency {} Hz",
                self.center_freq
            )));
        }
        let Some(len) = self.multiplier.checked_mul(self.block_size) else {
            return Err(Error::config(format!(
                "buffer length overflows: {} blocks of {} samples",
                self.multiplier, self.block_size
            )));
        };
        if Duration::try_from_secs_f64(len as f64 / self.sample_rate).is_err() {
            return Err(Error::config(format!(
                "sample rate {} Hz too low for {} samples",
                self.sample_rate, len
            )));
        }
        if self.timeout_us < 0 {
            return Err(Error::config(format!(
                "invalid read timeout {} us",
                self.timeout_us
            )));
        }
        Ok(())
    }
}

/// Time taken to produce `samples` at `rate` Hz, saturating at `Duration::MAX`
fn sample_time(samples: usize, rate: f64) -> Duration {
    Duration::try_from_secs_f64(samples as f64 / rate).unwrap_or(Duration::MAX)
}

/// Receive capabilities of one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    pub antennas: Vec<String>,
    pub gains: Vec<String>,
    pub frequency_ranges: Vec<FrequencyRange>,
}

impl Capabilities {
    pub fn query<D: RadioDevice>(device: &D, channel: usize) -> error::Result<Self> {
        Ok(Self {
            antennas: device.antennas(Direction::Rx, channel)?,
            gains: device.gains(Direction::Rx, channel)?,
            frequency_ranges: device.frequency_range(Direction::Rx, channel)?,
        })
    }

    pub fn tunable(&self, frequency: f64) -> bool {
        self.frequency_ranges.is_empty()
            || self.frequency_ranges.iter().any(|r| r.contains(frequency))
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "Rx antennas: ")?;
        for antenna in &self.antennas {
            write!(out, "{},", antenna)?;
        }
        writeln!(out)?;
        write!(out, "Rx Gains: ")?;
        for gain in &self.gains {
            write!(out, "{}, ", gain)?;
        }
        writeln!(out)?;
        write!(out, "Rx freq ranges: ")?;
        for range in &self.frequency_ranges {
            write!(out, "{}, ", range)?;
        }
        writeln!(out)
    }
}

/// Apply sample rate, frequency and gain to the receive channel
pub fn configure<D: RadioDevice>(device: &D, config: &BenchConfig) -> error::Result<()> {
    let ch = config.channel;
    device
        .set_sample_rate(Direction::Rx, ch, config.sample_rate)
        .map_err(|e| {
            Error::config(format!("sample rate {} Hz rejected: {}", config.sample_rate, e))
        })?;
    device
        .set_frequency(Direction::Rx, ch, config.center_freq)
        .map_err(|e| {
            Error::config(format!(
                "center frequency {} Hz rejected: {}",
                config.center_freq, e
            ))
        })?;
    if let Gain::Manual(gain_db) = config.gain {
        device
            .set_gain(Direction::Rx, ch, gain_db)
            .map_err(|e| Error::config(format!("gain {} dB rejected: {}", gain_db, e)))?;
    }
    info!(
        "rx channel {} configured: {} Hz at {} S/s, gain {:?}",
        ch, config.center_freq, config.sample_rate, config.gain
    );
    Ok(())
}

/// Timings of one iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// 0-based iteration number
    pub index: usize,
    pub read_time: Duration,
    /// Zero when the transform is disabled
    pub fft_time: Duration,
    /// Reads that returned fewer samples than requested
    pub short_reads: usize,
}

impl IterationReport {
    pub fn total(&self) -> Duration {
        self.read_time + self.fft_time
    }
}

/// Outcome of a full acquisition run
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionReport {
    pub iterations: Vec<IterationReport>,
    /// Samples per iteration
    pub buffer_len: usize,
    pub sample_rate: f64,
    pub fft: bool,
}

impl AcquisitionReport {
    pub fn dropped_reads(&self) -> usize {
        self.iterations.iter().map(|it| it.short_reads).sum()
    }

    pub fn mean_read_time(&self) -> Duration {
        mean(self.iterations.iter().map(|it| it.read_time))
    }

    pub fn mean_fft_time(&self) -> Duration {
        mean(self.iterations.iter().map(|it| it.fft_time))
    }

    /// Time the radio takes to fill the buffer once
    pub fn realtime_budget(&self) -> Duration {
        sample_time(self.buffer_len, self.sample_rate)
    }

    /// Whether the transform completes within the time it takes to acquire
    /// the next buffer
    pub fn keeps_up(&self) -> bool {
        self.mean_fft_time() <= self.realtime_budget()
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "{} iterations, {} dropped read(s), mean read time {:.0} us, mean fft time {:.0} us",
            self.iterations.len(),
            self.dropped_reads(),
            micros(self.mean_read_time()),
            micros(self.mean_fft_time()),
        )?;
        if self.fft {
            writeln!(
                out,
                "real-time budget {:.0} us: fft {}",
                micros(self.realtime_budget()),
                if self.keeps_up() { "keeps up" } else { "falls behind" }
            )?;
        }
        Ok(())
    }
}

fn mean<I: Iterator<Item = Duration>>(durations: I) -> Duration {
    let (sum, n) = durations.fold((Duration::ZERO, 0u32), |(s, n), d| (s + d, n + 1));
    if n == 0 { Duration::ZERO } else { sum / n }
}

fn micros(d: Duration) -> f64 {
    d.as_secs_f64() * 1e6
}

/// Set up a receive stream on `device` and run the timed loop.
///
/// The stream is deactivated and closed before this returns, on success and
/// on error alike. Progress lines go to `out`.
pub fn run_acquisition<D: RadioDevice, W: Write>(
    device: &D,
    config: &BenchConfig,
    out: &mut W,
) -> error::Result<AcquisitionReport> {
    config.validate()?;

    let mut rx = stream::open(device, config.channel)?;
    rx.activate()?;

    // plan is declared after the buffer so it is dropped first
    let mut buffer = SampleBuffer::new(config.buffer_len());
    let mut plan = if config.fft {
        writeln!(out, "using {} threads", config.threads)?;
        Some(TransformPlan::new(
            config.buffer_len(),
            config.threads,
            config.effort,
        )?)
    } else {
        None
    };

    writeln!(
        out,
        "sample duration {:.0} us",
        micros(config.block_duration())
    )?;

    let mut iterations = Vec::with_capacity(config.iterations);
    for index in 0..config.iterations {
        let start = Instant::now();
        let mut short_reads = 0;
        for block in buffer.input_mut().chunks_exact_mut(config.block_size) {
            let read = rx.read_block(block, config.timeout_us).inspect_err(|e| {
                tracing::error!("iteration {}: read failed: {}", index, e);
            })?;
            if read.is_short() {
                short_reads += 1;
                warn!(
                    "iteration {}: {} of {} samples received",
                    index,
                    read.received(),
                    config.block_size
                );
                writeln!(out, "Samples dropped")?;
            }
        }
        let inter = Instant::now();
        if let Some(plan) = plan.as_mut() {
            plan.execute(&mut buffer)?;
        }
        let end = Instant::now();

        let report = IterationReport {
            index,
            read_time: inter - start,
            fft_time: end - inter,
            short_reads,
        };
        debug!("{:?}", report);
        writeln!(
            out,
            "read time {:.0} us, fft time {:.0} us, total {:.0} us",
            micros(report.read_time),
            micros(report.fft_time),
            micros(report.total())
        )?;
        iterations.push(report);
    }

    rx.close()?;

    Ok(AcquisitionReport {
        iterations,
        buffer_len: config.buffer_len(),
        sample_rate: config.sample_rate,
        fft: config.fft,
    })
}

/// Full benchmark: discover, open, query, configure, acquire.
///
/// The device is released when this returns, after its stream has been
/// closed.
pub fn run<R: RadioDriver, W: Write>(
    driver: &R,
    selection: &DeviceSelection,
    config: &BenchConfig,
    out: &mut W,
) -> error::Result<AcquisitionReport> {
    config.validate()?;

    let results = driver.enumerate(&selection.filter)?;
    for (i, args) in results.iter().enumerate() {
        writeln!(out, "Found device #{}: {}", i, args)?;
    }
    let args = device::select_device(&results, selection.index)?;
    info!("opening device #{}: {}", selection.index, args);

    let device = driver.make(args)?;

    let caps = Capabilities::query(&device, config.channel)?;
    caps.write_to(out)?;
    if !caps.tunable(config.center_freq) {
        warn!(
            "{} Hz lies outside every advertised frequency range",
            config.center_freq
        );
    }

    configure(&device, config)?;
    run_acquisition(&device, config, out)
}
