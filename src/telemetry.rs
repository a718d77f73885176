//! Client side of the simulator's telemetry stream.
//!
//! The peer pushes raw frames of [`STATE_SIZE`] consecutive little-endian
//! IEEE-754 doubles with no length prefix; frame boundaries are defined by
//! the fixed size alone, so the channel buffers until a full frame is
//! available before decoding. Altitude arrives in the wire's down-positive
//! frame and is flipped to up-positive here, at the frame boundary, so the
//! sign convention never leaks into the control loop.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

/// Number of double-precision fields in one vehicle-state frame.
pub const STATE_SIZE: usize = 12;

/// Wire size of one frame in bytes.
pub const FRAME_SIZE: usize = STATE_SIZE * 8;

/// Index of the timestamp field, in seconds.
///
/// A negative timestamp is the peer's stop request.
pub const STATE_TIME: usize = 0;

/// Index of the altitude field, in meters, down-positive on the wire.
pub const STATE_Z: usize = 8;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The peer refused the connection. Reported once, not retried.
    #[error("telemetry peer {host}:{port} is not reachable; start the simulator before the controller")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The peer ended the stream on a frame boundary. This is how a session
    /// normally ends and is not treated as a fault by the control loop.
    #[error("telemetry stream closed by peer")]
    ChannelClosed,

    /// The stream ended mid-frame. The partial bytes are discarded rather
    /// than decoded short.
    #[error("malformed telemetry frame: stream ended after {got} of {expected} bytes")]
    MalformedFrame { got: usize, expected: usize },

    #[error("telemetry socket error")]
    Io(#[from] io::Error),
}

/// One decoded vehicle-state frame.
///
/// Exactly [`STATE_SIZE`] values, immutable once decoded. The controller
/// only reads the timestamp and altitude fields; the rest of the state
/// vector (horizontal position, velocity and attitude pairs) is carried
/// opaquely for callers that want it.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryFrame {
    values: [f64; STATE_SIZE],
}

impl TelemetryFrame {
    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Self {
        let mut values = [0.; STATE_SIZE];
        for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(8)) {
            *value = f64::from_le_bytes(chunk.try_into().unwrap());
        }
        Self { values }
    }

    /// Simulation time in seconds. Negative means the peer requested a stop.
    pub fn timestamp(&self) -> f64 {
        self.values[STATE_TIME]
    }

    /// Altitude in meters, up-positive.
    ///
    /// The wire value is down-positive (NED), so it is negated here.
    pub fn altitude(&self) -> f64 {
        -self.values[STATE_Z]
    }

    pub fn values(&self) -> &[f64; STATE_SIZE] {
        &self.values
    }
}

/// Owns the stream connection to the telemetry peer.
///
/// The socket is held for the lifetime of the channel and released when the
/// channel is dropped, whichever code path tears it down.
pub struct TelemetryChannel {
    stream: TcpStream,
    buf: [u8; FRAME_SIZE],
    filled: usize,
}

impl TelemetryChannel {
    /// Connect to the telemetry peer. A refused connection is reported to
    /// the caller after a single attempt.
    pub async fn connect(host: &str, port: u16) -> Result<Self, TelemetryError> {
        let stream =
            TcpStream::connect((host, port))
                .await
                .map_err(|source| TelemetryError::Connection {
                    host: host.to_owned(),
                    port,
                    source,
                })?;

        info!(host, port, "connected to telemetry peer");

        Ok(Self {
            stream,
            buf: [0; FRAME_SIZE],
            filled: 0,
        })
    }

    /// Wait up to `timeout` for one complete frame.
    ///
    /// Returns `Ok(None)` if no full frame arrived in time; any bytes
    /// already read stay buffered for the next call, so a frame split
    /// across transport reads is reassembled rather than decoded short.
    ///
    /// Fails with [`TelemetryError::ChannelClosed`] on a clean end of
    /// stream and [`TelemetryError::MalformedFrame`] if the stream ends
    /// inside a frame (the partial frame is discarded).
    pub async fn recv_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<TelemetryFrame>, TelemetryError> {
        let deadline = Instant::now() + timeout;

        while self.filled < FRAME_SIZE {
            match timeout_at(deadline, self.stream.read(&mut self.buf[self.filled..])).await {
                // No complete frame this tick; keep the partial bytes.
                Err(_elapsed) => return Ok(None),
                Ok(Ok(0)) => {
                    if self.filled == 0 {
                        return Err(TelemetryError::ChannelClosed);
                    }
                    let got = self.filled;
                    self.filled = 0;
                    return Err(TelemetryError::MalformedFrame {
                        got,
                        expected: FRAME_SIZE,
                    });
                }
                Ok(Ok(n)) => {
                    self.filled += n;
                    debug!(read = n, filled = self.filled, "telemetry bytes");
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        self.filled = 0;
        Ok(Some(TelemetryFrame::from_bytes(&self.buf)))
    }
}
