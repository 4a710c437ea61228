//! Radio device abstraction
//!
//! The benchmark talks to hardware through three traits: a [`RadioDriver`]
//! discovers and constructs devices, a [`RadioDevice`] answers capability
//! queries and accepts configuration, and an [`RxStream`] delivers samples.
//! The SoapySDR backend lives in [`crate::soapy`]; tests drive the same code
//! with mock implementations.

use std::fmt;

use num_complex::Complex;

use crate::error::{self, Error};

/**
 * Stream direction
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/**
 * Capability set: the ordered key/value pairs a device advertises
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceArgs {
    pairs: Vec<(String, String)>,
}

impl DeviceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, keeping the original position of an existing key
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = DeviceArgs::new();
        for (k, v) in iter {
            args.set(k, v);
        }
        args
    }
}

impl fmt::Display for DeviceArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Tunable frequency range in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub minimum: f64,
    pub maximum: f64,
    pub step: f64,
}

impl FrequencyRange {
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum,
            maximum,
            step: 0.0,
        }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.minimum && frequency <= self.maximum
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} Hz -> {} Hz]", self.minimum, self.maximum)
    }
}

/// Device discovery and construction
pub trait RadioDriver {
    type Device: RadioDevice;

    /// List the capability sets of every device matching `filter`
    /// (e.g. `"driver=rtlsdr"`, or `""` for all). An empty list is not an
    /// error.
    fn enumerate(&self, filter: &str) -> error::Result<Vec<DeviceArgs>>;

    /// Open the device described by `args`. Dropping the returned handle
    /// releases the device.
    fn make(&self, args: &DeviceArgs) -> error::Result<Self::Device>;
}

/// An open radio device
pub trait RadioDevice {
    /// Receive stream type; it borrows the device and cannot outlive it.
    type Stream<'a>: RxStream
    where
        Self: 'a;

    fn antennas(&self, direction: Direction, channel: usize) -> error::Result<Vec<String>>;

    fn gains(&self, direction: Direction, channel: usize) -> error::Result<Vec<String>>;

    fn frequency_range(
        &self,
        direction: Direction,
        channel: usize,
    ) -> error::Result<Vec<FrequencyRange>>;

    fn set_sample_rate(&self, direction: Direction, channel: usize, rate: f64)
    -> error::Result<()>;

    fn set_frequency(
        &self,
        direction: Direction,
        channel: usize,
        frequency: f64,
    ) -> error::Result<()>;

    fn set_gain(&self, direction: Direction, channel: usize, gain_db: f64) -> error::Result<()>;

    /// Set up a receive stream of complex 32-bit float samples on `channel`
    fn rx_stream(&self, channel: usize) -> error::Result<Self::Stream<'_>>;
}

/// A receive stream of CF32 samples
pub trait RxStream {
    fn activate(&mut self) -> error::Result<()>;

    fn deactivate(&mut self) -> error::Result<()>;

    /// Read up to `buf.len()` samples, waiting at most `timeout_us`.
    /// Returns the number of samples written to the front of `buf`.
    fn read(&mut self, buf: &mut [Complex<f32>], timeout_us: i64) -> error::Result<usize>;

    /// Release the stream
    fn close(self) -> error::Result<()>
    where
        Self: Sized;
}

/**
 * Which discovered device to open
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    /// Discovery filter (e.g. "driver=hackrf")
    pub filter: String,
    /// Position in the discovery results (0 for the first device)
    pub index: usize,
}

/// Pick the capability set at `index`, guarding against empty or short
/// discovery results.
pub fn select_device(results: &[DeviceArgs], index: usize) -> error::Result<&DeviceArgs> {
    if results.is_empty() {
        return Err(Error::NoDevice);
    }
    results.get(index).ok_or(Error::DeviceIndex {
        index,
        found: results.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtl() -> DeviceArgs {
        [
            ("driver", "rtlsdr"),
            ("label", "Generic RTL2832U"),
            ("serial", "00000001"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_args_keep_insertion_order() {
        let args = rtl();
        let keys: Vec<&str> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["driver", "label", "serial"]);
    }

    #[test]
    fn test_args_set_replaces_in_place() {
        let mut args = rtl();
        args.set("driver", "hackrf");
        assert_eq!(args.len(), 3);
        assert_eq!(args.iter().next(), Some(("driver", "hackrf")));
    }

    #[test]
    fn test_args_display() {
        let args: DeviceArgs = [("driver", "airspy"), ("serial", "ab12")]
            .into_iter()
            .collect();
        assert_eq!(args.to_string(), "driver=airspy, serial=ab12");
        assert_eq!(DeviceArgs::new().to_string(), "");
    }

    #[test]
    fn test_select_device_empty() {
        let err = select_device(&[], 0).unwrap_err();
        assert!(matches!(err, Error::NoDevice));
    }

    #[test]
    fn test_select_device_out_of_range() {
        let results = vec![rtl()];
        let err = select_device(&results, 1).unwrap_err();
        assert!(matches!(err, Error::DeviceIndex { index: 1, found: 1 }));
    }

    #[test]
    fn test_select_first_device() {
        let results = vec![rtl(), DeviceArgs::new()];
        let args = select_device(&results, 0).unwrap();
        assert_eq!(args, &rtl());
    }

    #[test]
    fn test_frequency_range() {
        let range = FrequencyRange::new(24e6, 1.766e9);
        assert!(range.contains(433e6));
        assert!(!range.contains(2.4e9));
        assert_eq!(range.to_string(), "[24000000 Hz -> 1766000000 Hz]");
    }
}
