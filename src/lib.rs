#![doc = include_str!("../readme.md")]

pub mod bench;
pub mod device;
pub mod error;
pub mod fft;
#[cfg(feature = "soapy")]
pub mod soapy;
pub mod stream;

pub use bench::{AcquisitionReport, BenchConfig, IterationReport, run, run_acquisition};
pub use device::{DeviceArgs, DeviceSelection, Direction, RadioDevice, RadioDriver, RxStream};
pub use error::{Error, Result, StreamErrorKind};
pub use fft::{PlanEffort, SampleBuffer, TransformPlan};

/**
 * Tuner gain setting
 */
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Gain {
    /// Leave the gain to the device (AGC or driver default)
    Auto,
    /// Overall gain in dB
    Manual(f64),
}
