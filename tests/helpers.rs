//! Mock radio driver for exercising the benchmark without hardware
//!
//! Every call made on the driver, the device and its stream is appended to a
//! shared log so tests can check what was called and in which order.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::f32::consts::PI;
use std::rc::Rc;

use num_complex::Complex;
use rxbench::device::{DeviceArgs, Direction, FrequencyRange, RadioDevice, RadioDriver, RxStream};
use rxbench::{Error, Result, StreamErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Enumerate(String),
    Make,
    Antennas,
    Gains,
    FrequencyRange,
    SetSampleRate(f64),
    SetFrequency(f64),
    SetGain(f64),
    SetupStream(usize),
    Activate,
    Read(usize),
    Deactivate,
    Close,
    Unmake,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// What the mock hardware should do
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Capability sets returned by discovery
    pub devices: Vec<DeviceArgs>,
    pub fail_make: bool,
    pub fail_sample_rate: bool,
    pub fail_stream: bool,
    /// 1-based read numbers that deliver one sample less than requested
    pub short_reads: Vec<usize>,
    /// 1-based read numbers that fail with the given error kind
    pub failed_reads: Vec<(usize, StreamErrorKind)>,
}

impl Behavior {
    /// One healthy device
    pub fn healthy() -> Self {
        Self {
            devices: vec![mock_args("mock", "0")],
            ..Default::default()
        }
    }
}

pub fn mock_args(driver: &str, serial: &str) -> DeviceArgs {
    [("driver", driver), ("label", "Mock SDR"), ("serial", serial)]
        .into_iter()
        .collect()
}

pub struct MockDriver {
    behavior: Behavior,
    log: CallLog,
}

impl MockDriver {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            log: CallLog::default(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.log.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn reads(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Read(_)))
            .count()
    }

    /// Position of the first occurrence of `call` in the log
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.log.borrow().iter().position(|c| c == call)
    }
}

impl RadioDriver for MockDriver {
    type Device = MockDevice;

    fn enumerate(&self, filter: &str) -> Result<Vec<DeviceArgs>> {
        self.log.borrow_mut().push(Call::Enumerate(filter.to_string()));
        Ok(self.behavior.devices.clone())
    }

    fn make(&self, _args: &DeviceArgs) -> Result<MockDevice> {
        self.log.borrow_mut().push(Call::Make);
        if self.behavior.fail_make {
            return Err(Error::device("SoapySDR::Device::make failed"));
        }
        Ok(MockDevice {
            behavior: self.behavior.clone(),
            log: Rc::clone(&self.log),
            reads: Cell::new(0),
        })
    }
}

pub struct MockDevice {
    behavior: Behavior,
    log: CallLog,
    reads: Cell<usize>,
}

impl MockDevice {
    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.record(Call::Unmake);
    }
}

impl RadioDevice for MockDevice {
    type Stream<'a>
        = MockStream<'a>
    where
        Self: 'a;

    fn antennas(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        self.record(Call::Antennas);
        Ok(vec!["RX".to_string(), "TX/RX".to_string()])
    }

    fn gains(&self, _direction: Direction, _channel: usize) -> Result<Vec<String>> {
        self.record(Call::Gains);
        Ok(vec!["LNA".to_string(), "VGA".to_string()])
    }

    fn frequency_range(&self, _direction: Direction, _channel: usize) -> Result<Vec<FrequencyRange>> {
        self.record(Call::FrequencyRange);
        Ok(vec![FrequencyRange::new(1e6, 6e9)])
    }

    fn set_sample_rate(&self, _direction: Direction, _channel: usize, rate: f64) -> Result<()> {
        self.record(Call::SetSampleRate(rate));
        if self.behavior.fail_sample_rate {
            return Err(Error::other("unsupported sample rate"));
        }
        Ok(())
    }

    fn set_frequency(&self, _direction: Direction, _channel: usize, frequency: f64) -> Result<()> {
        self.record(Call::SetFrequency(frequency));
        Ok(())
    }

    fn set_gain(&self, _direction: Direction, _channel: usize, gain_db: f64) -> Result<()> {
        self.record(Call::SetGain(gain_db));
        Ok(())
    }

    fn rx_stream(&self, channel: usize) -> Result<MockStream<'_>> {
        self.record(Call::SetupStream(channel));
        if self.behavior.fail_stream {
            return Err(Error::device("setupStream failed"));
        }
        Ok(MockStream { device: self })
    }
}

pub struct MockStream<'a> {
    device: &'a MockDevice,
}

impl RxStream for MockStream<'_> {
    fn activate(&mut self) -> Result<()> {
        self.device.record(Call::Activate);
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.device.record(Call::Deactivate);
        Ok(())
    }

    fn read(&mut self, buf: &mut [Complex<f32>], _timeout_us: i64) -> Result<usize> {
        let n = self.device.reads.get() + 1;
        self.device.reads.set(n);
        self.device.record(Call::Read(buf.len()));

        let behavior = &self.device.behavior;
        if let Some((_, kind)) = behavior.failed_reads.iter().find(|(i, _)| *i == n) {
            return Err(Error::stream(*kind, format!("mock read #{} failed", n)));
        }
        let count = if behavior.short_reads.contains(&n) {
            buf.len() - 1
        } else {
            buf.len()
        };
        // a tone at a quarter of the sample rate
        for (i, v) in buf[..count].iter_mut().enumerate() {
            let phase = 0.5 * PI * i as f32;
            *v = Complex::new(phase.cos(), phase.sin());
        }
        Ok(count)
    }

    fn close(self) -> Result<()> {
        self.device.record(Call::Close);
        Ok(())
    }
}
