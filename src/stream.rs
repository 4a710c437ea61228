//! Receive stream lifecycle
//!
//! [`StreamGuard`] owns an opened [`RxStream`] and enforces the order
//! `Opened → Active → Inactive → Closed`. A stream that has not been set up
//! yet has no guard at all. Dropping a guard that was not closed explicitly
//! deactivates and closes the stream, so every exit path releases it exactly
//! once, before the device it borrows.

use std::fmt;

use num_complex::Complex;
use tracing::{debug, warn};

use crate::device::{RadioDevice, RxStream};
use crate::error::{self, Error};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    Opened,
    Active,
    Inactive,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Opened => "opened",
            StreamState::Active => "active",
            StreamState::Inactive => "inactive",
            StreamState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outcome of one block read
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockRead {
    /// The whole block was delivered
    Complete(usize),
    /// Fewer samples than requested: samples were dropped upstream
    Short { requested: usize, received: usize },
}

impl BlockRead {
    pub fn received(&self) -> usize {
        match *self {
            BlockRead::Complete(n) => n,
            BlockRead::Short { received, .. } => received,
        }
    }

    pub fn is_short(&self) -> bool {
        matches!(self, BlockRead::Short { .. })
    }
}

pub struct StreamGuard<S: RxStream> {
    stream: Option<S>,
    state: StreamState,
}

impl<S: RxStream> StreamGuard<S> {
    /// Wrap a stream that has just been set up
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            state: StreamState::Opened,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn activate(&mut self) -> error::Result<()> {
        self.expect_state(StreamState::Opened, "activate")?;
        self.stream_mut()?.activate()?;
        self.state = StreamState::Active;
        debug!("rx stream activated");
        Ok(())
    }

    /// Read one block into `buf`, classifying the result.
    ///
    /// Short reads, and driver timeouts or overflows, come back as
    /// [`BlockRead::Short`]. Any other stream error is returned as is.
    pub fn read_block(
        &mut self,
        buf: &mut [Complex<f32>],
        timeout_us: i64,
    ) -> error::Result<BlockRead> {
        self.expect_state(StreamState::Active, "read")?;
        let requested = buf.len();
        match self.stream_mut()?.read(buf, timeout_us) {
            Ok(n) if n >= requested => Ok(BlockRead::Complete(n)),
            Ok(received) => Ok(BlockRead::Short {
                requested,
                received,
            }),
            Err(Error::Stream { kind, message }) if kind.is_sample_loss() => {
                debug!("read returned {} ({}): {}", kind.name(), kind.code(), message);
                Ok(BlockRead::Short {
                    requested,
                    received: 0,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Stop streaming. The call is attempted once; the stream is considered
    /// inactive afterwards even if the driver reported an error.
    pub fn deactivate(&mut self) -> error::Result<()> {
        self.expect_state(StreamState::Active, "deactivate")?;
        self.state = StreamState::Inactive;
        let res = self.stream_mut()?.deactivate();
        debug!("rx stream deactivated");
        res
    }

    /// Deactivate if needed, then close the stream
    pub fn close(mut self) -> error::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> error::Result<()> {
        let deactivated = if self.state == StreamState::Active {
            self.deactivate()
        } else {
            Ok(())
        };
        let closed = match self.stream.take() {
            Some(stream) => {
                self.state = StreamState::Closed;
                let res = stream.close();
                debug!("rx stream closed");
                res
            }
            None => Ok(()),
        };
        deactivated.and(closed)
    }

    fn stream_mut(&mut self) -> error::Result<&mut S> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::StreamState("stream already closed".to_string()))
    }

    fn expect_state(&self, expected: StreamState, op: &str) -> error::Result<()> {
        if self.state != expected {
            return Err(Error::StreamState(format!(
                "cannot {} a stream in state {} (expected {})",
                op, self.state, expected
            )));
        }
        Ok(())
    }
}

impl<S: RxStream> Drop for StreamGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("failed to shut down rx stream: {}", e);
        }
    }
}

/// Set up a receive stream on `channel` and wrap it in a guard
pub fn open<D: RadioDevice>(
    device: &D,
    channel: usize,
) -> error::Result<StreamGuard<D::Stream<'_>>> {
    let stream = device.rx_stream(channel)?;
    debug!("rx stream set up on channel {}", channel);
    Ok(StreamGuard::new(stream))
}
