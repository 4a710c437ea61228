//! Forward transform over the acquisition buffer
//!
//! A [`TransformPlan`] is built once for a fixed length and executed on every
//! iteration against the same [`SampleBuffer`]. Two strategies are
//! available:
//!
//! - a single rustfft forward plan, run on the calling thread;
//! - a four-step decomposition `N = n1 × n2` whose row transforms, twiddle
//!   multiplications and transposes are split across scoped worker threads.
//!
//! [`PlanEffort`] selects between them, either heuristically or by timing
//! both on the actual length.
//!
//! Every transform is computed by rustfft. The four-step strategy only
//! splits one long transform into many short rustfft ones so that the
//! configured number of threads can share the work.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::{debug, info};

use crate::error::{self, Error};

/// Smallest factor accepted for the four-step decomposition
const MIN_FACTOR: usize = 64;

/// Planning effort
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlanEffort {
    /// Pick a strategy from the length and thread count alone
    Estimate,
    /// Time every candidate strategy once and keep the fastest
    Measure,
}

/**
 * Input/output sample buffers, allocated once and reused
 */
pub struct SampleBuffer {
    input: Vec<Complex<f32>>,
    output: Vec<Complex<f32>>,
}

impl SampleBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            input: vec![Complex::new(0.0, 0.0); len],
            output: vec![Complex::new(0.0, 0.0); len],
        }
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn input_mut(&mut self) -> &mut [Complex<f32>] {
        &mut self.input
    }

    /// Spectrum written by the last [`TransformPlan::execute`]
    pub fn output(&self) -> &[Complex<f32>] {
        &self.output
    }
}

enum Strategy {
    Single {
        fft: Arc<dyn Fft<f32>>,
        scratch: Vec<Complex<f32>>,
    },
    FourStep(FourStep),
}

pub struct TransformPlan {
    len: usize,
    threads: usize,
    strategy: Strategy,
}

impl TransformPlan {
    pub fn new(len: usize, threads: usize, effort: PlanEffort) -> error::Result<Self> {
        if len == 0 {
            return Err(Error::transform("transform length must be positive"));
        }
        if threads == 0 {
            return Err(Error::transform("thread count must be at least 1"));
        }

        let mut planner = FftPlanner::<f32>::new();
        let plan = match effort {
            PlanEffort::Estimate => {
                if threads > 1 && factorize(len).is_some() {
                    Self::four_step(&mut planner, len, threads)
                } else {
                    Self::single(&mut planner, len)
                }
            }
            PlanEffort::Measure => {
                let mut candidates = vec![Self::single(&mut planner, len)];
                if threads > 1 && factorize(len).is_some() {
                    candidates.push(Self::four_step(&mut planner, len, threads));
                }
                let mut trial = SampleBuffer::new(len);
                let mut best: Option<(Duration, TransformPlan)> = None;
                for mut candidate in candidates {
                    let elapsed = candidate.time_once(&mut trial)?;
                    debug!(
                        "measured {} plan for {} points: {:?}",
                        candidate.strategy_name(),
                        len,
                        elapsed
                    );
                    if best.as_ref().is_none_or(|(t, _)| elapsed < *t) {
                        best = Some((elapsed, candidate));
                    }
                }
                match best {
                    Some((_, plan)) => plan,
                    None => Self::single(&mut planner, len),
                }
            }
        };

        info!(
            "transform plan: {} points, {} strategy, {} thread(s)",
            len,
            plan.strategy_name(),
            plan.threads
        );
        Ok(plan)
    }

    fn single(planner: &mut FftPlanner<f32>, len: usize) -> Self {
        let fft = planner.plan_fft_forward(len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_outofplace_scratch_len()];
        Self {
            len,
            threads: 1,
            strategy: Strategy::Single { fft, scratch },
        }
    }

    fn four_step(planner: &mut FftPlanner<f32>, len: usize, threads: usize) -> Self {
        match factorize(len) {
            Some((n1, n2)) => Self {
                len,
                threads,
                strategy: Strategy::FourStep(FourStep::new(planner, n1, n2, threads)),
            },
            None => Self::single(planner, len),
        }
    }

    fn time_once(&mut self, buffer: &mut SampleBuffer) -> error::Result<Duration> {
        for (i, v) in buffer.input.iter_mut().enumerate() {
            *v = Complex::new((i % 7) as f32, (i % 3) as f32);
        }
        let start = Instant::now();
        self.execute(buffer)?;
        Ok(start.elapsed())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of threads one execution runs on
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::Single { .. } => "single",
            Strategy::FourStep(_) => "four-step",
        }
    }

    /// Forward DFT of `buffer.input` into `buffer.output`.
    ///
    /// The input is used as scratch space and holds unspecified values
    /// afterwards. Returns once every worker thread has finished.
    pub fn execute(&mut self, buffer: &mut SampleBuffer) -> error::Result<()> {
        if buffer.len() != self.len {
            return Err(Error::transform(format!(
                "plan built for {} points cannot run on a {}-sample buffer",
                self.len,
                buffer.len()
            )));
        }
        match &mut self.strategy {
            Strategy::Single { fft, scratch } => {
                fft.process_outofplace_with_scratch(&mut buffer.input, &mut buffer.output, scratch);
            }
            Strategy::FourStep(plan) => plan.execute(&mut buffer.input, &mut buffer.output),
        }
        Ok(())
    }
}

/// Split `len` into `n1 × n2` with `n1` the largest divisor not above
/// `sqrt(len)`; both factors must reach [`MIN_FACTOR`].
fn factorize(len: usize) -> Option<(usize, usize)> {
    let root = (len as f64).sqrt() as usize;
    let n1 = (MIN_FACTOR..=root).rev().find(|d| len % d == 0)?;
    Some((n1, len / n1))
}

struct FourStep {
    n1: usize,
    n2: usize,
    threads: usize,
    first: Arc<dyn Fft<f32>>,
    second: Arc<dyn Fft<f32>>,
    /// `exp(-2πi m / N)` for `m` in `0..N`
    twiddles: Vec<Complex<f32>>,
    /// One scratch area per worker
    scratch: Vec<Vec<Complex<f32>>>,
}

impl FourStep {
    fn new(planner: &mut FftPlanner<f32>, n1: usize, n2: usize, threads: usize) -> Self {
        let len = n1 * n2;
        let first = planner.plan_fft_forward(n1);
        let second = planner.plan_fft_forward(n2);
        let twiddles = (0..len)
            .map(|m| {
                let angle = -2.0 * PI * m as f64 / len as f64;
                Complex::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        let scratch_len = first
            .get_inplace_scratch_len()
            .max(second.get_inplace_scratch_len());
        Self {
            n1,
            n2,
            threads,
            first,
            second,
            twiddles,
            scratch: vec![vec![Complex::new(0.0, 0.0); scratch_len]; threads],
        }
    }

    // Input index n = n2·a + b, output index k = k1 + n1·k2:
    //   X[k] = Σ_b W_N^(b·k1) W_n2^(b·k2) Σ_a x[n2·a + b] W_n1^(a·k1)
    fn execute(&mut self, input: &mut [Complex<f32>], output: &mut [Complex<f32>]) {
        let (n1, n2, threads) = (self.n1, self.n2, self.threads);

        // columns of x become contiguous rows of length n1
        transpose(input, output, n1, n2, threads);

        let first = &self.first;
        let twiddles = &self.twiddles;
        for_each_rows(output, n1, &mut self.scratch, |row0, rows, scratch| {
            first.process_with_scratch(rows, scratch);
            for (i, row) in rows.chunks_exact_mut(n1).enumerate() {
                let b = row0 + i;
                for (k1, v) in row.iter_mut().enumerate().skip(1) {
                    *v *= twiddles[b * k1];
                }
            }
        });

        transpose(output, input, n2, n1, threads);

        let second = &self.second;
        for_each_rows(input, n2, &mut self.scratch, |_, rows, scratch| {
            second.process_with_scratch(rows, scratch);
        });

        transpose(input, output, n1, n2, threads);
    }
}

/// Split `data` into rows of `row_len` and hand contiguous groups of rows to
/// one worker per scratch area. `f` receives the index of the first row in
/// its group.
fn for_each_rows<F>(
    data: &mut [Complex<f32>],
    row_len: usize,
    scratch: &mut [Vec<Complex<f32>>],
    f: F,
) where
    F: Fn(usize, &mut [Complex<f32>], &mut [Complex<f32>]) + Sync,
{
    let rows = data.len() / row_len;
    let per_worker = rows.div_ceil(scratch.len().max(1));
    if scratch.len() <= 1 {
        if let Some(s) = scratch.first_mut() {
            f(0, data, s);
        }
        return;
    }
    std::thread::scope(|s| {
        for (w, (chunk, scratch)) in data
            .chunks_mut(per_worker * row_len)
            .zip(scratch.iter_mut())
            .enumerate()
        {
            let f = &f;
            s.spawn(move || f(w * per_worker, chunk, scratch));
        }
    });
}

/// `dst[c·rows + r] = src[r·cols + c]`, split across `threads` workers by
/// destination rows.
fn transpose(
    src: &[Complex<f32>],
    dst: &mut [Complex<f32>],
    rows: usize,
    cols: usize,
    threads: usize,
) {
    let per_worker = cols.div_ceil(threads.max(1));
    let fill = |c0: usize, block: &mut [Complex<f32>]| {
        for (i, out_row) in block.chunks_exact_mut(rows).enumerate() {
            let c = c0 + i;
            for (r, v) in out_row.iter_mut().enumerate() {
                *v = src[r * cols + c];
            }
        }
    };
    if threads <= 1 {
        fill(0, dst);
        return;
    }
    std::thread::scope(|s| {
        for (w, block) in dst.chunks_mut(per_worker * rows).enumerate() {
            let fill = &fill;
            s.spawn(move || fill(w * per_worker, block));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(input: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let mut data = input.to_vec();
        FftPlanner::<f32>::new()
            .plan_fft_forward(data.len())
            .process(&mut data);
        data
    }

    fn signal(len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|i| {
                let t = i as f32;
                Complex::new((0.013 * t).sin() + 0.25, (0.071 * t).cos() - (i % 5) as f32 * 0.1)
            })
            .collect()
    }

    fn assert_close(a: &[Complex<f32>], b: &[Complex<f32>]) {
        let peak = b.iter().map(|c| c.norm()).fold(0.0f32, f32::max);
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!(
                (x - y).norm() <= peak * 1e-4,
                "bin {}: {} vs {}",
                i,
                x,
                y
            );
        }
    }

    #[test]
    fn test_factorize() {
        assert_eq!(factorize(1 << 20), Some((1024, 1024)));
        assert_eq!(factorize(64 * 128), Some((64, 128)));
        assert_eq!(factorize(4096 * 3), Some((96, 128)));
        assert_eq!(factorize(1000), None);
        assert_eq!(factorize(65537), None);
    }

    #[test]
    fn test_four_step_matches_rustfft() {
        let len = 64 * 96;
        let input = signal(len);
        let mut plan = TransformPlan::new(len, 3, PlanEffort::Estimate).unwrap();
        assert_eq!(plan.strategy_name(), "four-step");

        let mut buffer = SampleBuffer::new(len);
        buffer.input_mut().copy_from_slice(&input);
        plan.execute(&mut buffer).unwrap();
        assert_close(buffer.output(), &reference(&input));
    }

    #[test]
    fn test_four_step_is_repeatable() {
        let len = 128 * 128;
        let input = signal(len);
        let mut plan = TransformPlan::new(len, 6, PlanEffort::Estimate).unwrap();
        let mut buffer = SampleBuffer::new(len);
        for _ in 0..2 {
            buffer.input_mut().copy_from_slice(&input);
            plan.execute(&mut buffer).unwrap();
        }
        assert_close(buffer.output(), &reference(&input));
    }

    #[test]
    fn test_single_thread_uses_single_plan() {
        let plan = TransformPlan::new(1 << 14, 1, PlanEffort::Estimate).unwrap();
        assert_eq!(plan.strategy_name(), "single");
        assert_eq!(plan.threads(), 1);
    }

    #[test]
    fn test_unfactorable_length_uses_single_plan() {
        let len = 1000;
        let input = signal(len);
        let mut plan = TransformPlan::new(len, 4, PlanEffort::Estimate).unwrap();
        assert_eq!(plan.strategy_name(), "single");
        let mut buffer = SampleBuffer::new(len);
        buffer.input_mut().copy_from_slice(&input);
        plan.execute(&mut buffer).unwrap();
        assert_close(buffer.output(), &reference(&input));
    }

    #[test]
    fn test_measure_produces_working_plan() {
        let len = 64 * 64;
        let input = signal(len);
        let mut plan = TransformPlan::new(len, 2, PlanEffort::Measure).unwrap();
        assert_eq!(plan.len(), len);
        let mut buffer = SampleBuffer::new(len);
        buffer.input_mut().copy_from_slice(&input);
        plan.execute(&mut buffer).unwrap();
        assert_close(buffer.output(), &reference(&input));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut plan = TransformPlan::new(256, 1, PlanEffort::Estimate).unwrap();
        let mut buffer = SampleBuffer::new(512);
        let err = plan.execute(&mut buffer).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TransformPlan::new(0, 1, PlanEffort::Estimate).is_err());
        assert!(TransformPlan::new(1024, 0, PlanEffort::Estimate).is_err());
    }
}
