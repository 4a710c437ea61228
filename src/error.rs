//! Error handling for the rxbench library
//!
//! This module provides a unified error type for every stage of a benchmark
//! run: device discovery and construction, configuration, streaming and the
//! transform.

use std::fmt;
use std::io;

/// A specialized Result type for rxbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stream error codes, numbered as the SoapySDR C API returns them from
/// `readStream` (negative values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum StreamErrorKind {
    /// The read timed out before any sample arrived.
    Timeout = -1,
    /// Generic streaming failure.
    StreamError = -2,
    /// Samples were corrupted in transfer.
    Corruption = -3,
    /// Samples were lost in the driver or on the hardware (overflow).
    Overflow = -4,
    /// The requested operation is not supported by the stream.
    NotSupported = -5,
    /// Timestamp or timed-command error.
    TimeError = -6,
    /// Transmit underflow.
    Underflow = -7,
    /// Any other negative code.
    Other = -9999,
}

impl StreamErrorKind {
    /// Raw numeric code as returned by the driver.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a raw negative return value onto a known kind.
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => StreamErrorKind::Timeout,
            -2 => StreamErrorKind::StreamError,
            -3 => StreamErrorKind::Corruption,
            -4 => StreamErrorKind::Overflow,
            -5 => StreamErrorKind::NotSupported,
            -6 => StreamErrorKind::TimeError,
            -7 => StreamErrorKind::Underflow,
            _ => StreamErrorKind::Other,
        }
    }

    /// Whether the condition means samples were lost rather than the stream
    /// being broken. Such reads are reported as dropped and acquisition
    /// continues.
    pub fn is_sample_loss(self) -> bool {
        matches!(self, StreamErrorKind::Timeout | StreamErrorKind::Overflow)
    }

    /// Name of the matching `SOAPY_SDR_*` constant
    pub fn name(self) -> &'static str {
        match self {
            StreamErrorKind::Timeout => "SOAPY_SDR_TIMEOUT",
            StreamErrorKind::StreamError => "SOAPY_SDR_STREAM_ERROR",
            StreamErrorKind::Corruption => "SOAPY_SDR_CORRUPTION",
            StreamErrorKind::Overflow => "SOAPY_SDR_OVERFLOW",
            StreamErrorKind::NotSupported => "SOAPY_SDR_NOT_SUPPORTED",
            StreamErrorKind::TimeError => "SOAPY_SDR_TIME_ERROR",
            StreamErrorKind::Underflow => "SOAPY_SDR_UNDERFLOW",
            StreamErrorKind::Other => "SOAPY_SDR_OTHER",
        }
    }
}

/// Error type for rxbench operations
#[derive(Debug)]
pub enum Error {
    /// I/O error (console output, etc.)
    Io(io::Error),

    /// Discovery returned no device at all
    NoDevice,

    /// The requested device index is past the end of the discovery results
    DeviceIndex { index: usize, found: usize },

    /// Device construction or query error
    Device(String),

    /// A configuration call (sample rate, frequency, gain) was rejected
    Config(String),

    /// Stream-level error returned by a read or a lifecycle call
    Stream {
        kind: StreamErrorKind,
        message: String,
    },

    /// A stream operation was attempted in the wrong lifecycle state
    StreamState(String),

    /// Transform planning or execution error
    Transform(String),

    /// SoapySDR specific error (requires "soapy" feature)
    #[cfg(feature = "soapy")]
    SoapySdr(soapysdr::Error),

    /// Generic error with custom message
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::NoDevice => write!(f, "No device found"),
            Error::DeviceIndex { index, found } => write!(
                f,
                "Device index {} not found ({} device(s) discovered)",
                index, found
            ),
            Error::Device(msg) => write!(f, "Device error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Stream { kind, message } => write!(
                f,
                "Stream error {} ({}): {}",
                kind.name(),
                kind.code(),
                message
            ),
            Error::StreamState(msg) => write!(f, "Stream state error: {}", msg),
            Error::Transform(msg) => write!(f, "Transform error: {}", msg),
            #[cfg(feature = "soapy")]
            Error::SoapySdr(err) => write!(f, "SoapySDR error: {}", err),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            #[cfg(feature = "soapy")]
            Error::SoapySdr(err) => Some(err),
            _ => None,
        }
    }
}

// From conversions for common error types

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(feature = "soapy")]
impl From<soapysdr::Error> for Error {
    fn from(err: soapysdr::Error) -> Self {
        Error::SoapySdr(err)
    }
}

// Helper constructors for common error scenarios

impl Error {
    /// Create a device error with a custom message
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Error::Device(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a stream error of the given kind
    pub fn stream<S: Into<String>>(kind: StreamErrorKind, msg: S) -> Self {
        Error::Stream {
            kind,
            message: msg.into(),
        }
    }

    /// Create a transform error with a custom message
    pub fn transform<S: Into<String>>(msg: S) -> Self {
        Error::Transform(msg.into())
    }

    /// Create a generic error with a custom message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
