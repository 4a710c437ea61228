//! SoapySDR backend
//! (requires the `soapy` feature)
//!
//! This module implements the radio traits on top of the `soapysdr` crate:
//! discovery through `SoapySDR::Device::enumerate`, device construction, and
//! CF32 receive streams.

use std::marker::PhantomData;

use num_complex::Complex;
use soapysdr::{Args, Device, ErrorCode};
use tracing::info;

use crate::device::{DeviceArgs, Direction, FrequencyRange, RadioDevice, RadioDriver, RxStream};
use crate::error::{self, Error, StreamErrorKind};

fn direction(dir: Direction) -> soapysdr::Direction {
    match dir {
        Direction::Rx => soapysdr::Direction::Rx,
        Direction::Tx => soapysdr::Direction::Tx,
    }
}

fn stream_error(err: soapysdr::Error) -> Error {
    let kind = match err.code {
        ErrorCode::Timeout => StreamErrorKind::Timeout,
        ErrorCode::StreamError => StreamErrorKind::StreamError,
        ErrorCode::Corruption => StreamErrorKind::Corruption,
        ErrorCode::Overflow => StreamErrorKind::Overflow,
        ErrorCode::NotSupported => StreamErrorKind::NotSupported,
        ErrorCode::TimeError => StreamErrorKind::TimeError,
        ErrorCode::Underflow => StreamErrorKind::Underflow,
        _ => StreamErrorKind::Other,
    };
    Error::stream(kind, err.message)
}

impl From<&Args> for DeviceArgs {
    fn from(args: &Args) -> Self {
        args.iter().collect()
    }
}

impl From<&DeviceArgs> for Args {
    fn from(args: &DeviceArgs) -> Self {
        let mut soapy_args = Args::new();
        for (k, v) in args.iter() {
            soapy_args.set(k, v);
        }
        soapy_args
    }
}

/**
 * Driver backed by the installed SoapySDR modules
 */
#[derive(Debug, Default, Clone, Copy)]
pub struct SoapyDriver;

impl RadioDriver for SoapyDriver {
    type Device = SoapyDevice;

    fn enumerate(&self, filter: &str) -> error::Result<Vec<DeviceArgs>> {
        let results = soapysdr::enumerate(filter)?;
        Ok(results.iter().map(DeviceArgs::from).collect())
    }

    fn make(&self, args: &DeviceArgs) -> error::Result<SoapyDevice> {
        let device = Device::new(Args::from(args))
            .map_err(|e| Error::device(format!("SoapySDR::Device::make failed: {}", e)))?;
        if let (Ok(driver), Ok(hardware)) = (device.driver_key(), device.hardware_key()) {
            info!("opened SoapySDR device: driver={}, hardware={}", driver, hardware);
        }
        Ok(SoapyDevice { device })
    }
}

/**
 * Open SoapySDR device; unmade when dropped
 */
pub struct SoapyDevice {
    device: Device,
}

impl RadioDevice for SoapyDevice {
    type Stream<'a>
        = SoapyRxStream<'a>
    where
        Self: 'a;

    fn antennas(&self, dir: Direction, channel: usize) -> error::Result<Vec<String>> {
        Ok(self.device.antennas(direction(dir), channel)?)
    }

    fn gains(&self, dir: Direction, channel: usize) -> error::Result<Vec<String>> {
        Ok(self.device.list_gains(direction(dir), channel)?)
    }

    fn frequency_range(&self, dir: Direction, channel: usize) -> error::Result<Vec<FrequencyRange>> {
        let ranges = self.device.frequency_range(direction(dir), channel)?;
        Ok(ranges
            .iter()
            .map(|r| FrequencyRange {
                minimum: r.minimum,
                maximum: r.maximum,
                step: r.step,
            })
            .collect())
    }

    fn set_sample_rate(&self, dir: Direction, channel: usize, rate: f64) -> error::Result<()> {
        Ok(self.device.set_sample_rate(direction(dir), channel, rate)?)
    }

    fn set_frequency(&self, dir: Direction, channel: usize, frequency: f64) -> error::Result<()> {
        Ok(self
            .device
            .set_frequency(direction(dir), channel, frequency, ())?)
    }

    fn set_gain(&self, dir: Direction, channel: usize, gain_db: f64) -> error::Result<()> {
        Ok(self.device.set_gain(direction(dir), channel, gain_db)?)
    }

    fn rx_stream(&self, channel: usize) -> error::Result<SoapyRxStream<'_>> {
        let stream = self
            .device
            .rx_stream::<Complex<f32>>(&[channel])
            .map_err(|e| Error::device(format!("setupStream failed: {}", e)))?;
        if let Ok(mtu) = stream.mtu() {
            info!("rx stream MTU: {} samples", mtu);
        }
        Ok(SoapyRxStream {
            stream,
            _device: PhantomData,
        })
    }
}

/**
 * CF32 receive stream tied to the lifetime of its [`SoapyDevice`]
 */
pub struct SoapyRxStream<'a> {
    stream: soapysdr::RxStream<Complex<f32>>,
    _device: PhantomData<&'a SoapyDevice>,
}

impl RxStream for SoapyRxStream<'_> {
    fn activate(&mut self) -> error::Result<()> {
        self.stream.activate(None).map_err(stream_error)
    }

    fn deactivate(&mut self) -> error::Result<()> {
        self.stream.deactivate(None).map_err(stream_error)
    }

    fn read(&mut self, buf: &mut [Complex<f32>], timeout_us: i64) -> error::Result<usize> {
        self.stream.read(&mut [buf], timeout_us).map_err(stream_error)
    }

    fn close(self) -> error::Result<()> {
        // soapysdr closes the stream when it is dropped
        drop(self.stream);
        Ok(())
    }
}

