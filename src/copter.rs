//! The altitude-hold session loop.
//!
//! [`AltitudeHold`] glues the telemetry channel, the PID law and the motor
//! seam together: one cooperative loop, one session, no shared state. Time
//! comes from the telemetry stream itself, not the local clock, so the
//! controller steps exactly as fast as the vehicle reports state.

use crate::control::{ControlError, Gains, Pid};
use crate::error::Error;
use crate::hal::MotorOutput;
use crate::telemetry::{TelemetryChannel, TelemetryError, TelemetryFrame};
use nalgebra::Vector4;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Sleep between polls when no new frame is available. A cadence limiter,
/// not a real-time guarantee.
const IDLE_TICK: Duration = Duration::from_millis(1);

/// Samples at or beyond this magnitude are treated as sensor garbage.
const MAX_SANE_ALTITUDE: f64 = 100.;

/// Immutable session configuration, fixed at construction.
#[derive(Clone, Debug)]
pub struct Config {
    /// Telemetry peer endpoint.
    pub host: String,
    pub port: u16,

    /// Altitude to hold, in meters, up-positive.
    pub target_altitude: f64,

    pub gains: Gains,

    /// How long one receive call waits for a complete frame.
    pub frame_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5000,
            target_altitude: 10.,
            // Takeoff tuning: pure PD.
            gains: Gains {
                kp: 0.4125,
                ki: 0.,
                kd: 4.5,
            },
            frame_timeout: Duration::from_secs(1),
        }
    }
}

/// Session lifecycle. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Stopped,
}

/// One telemetry receive reduced to what the controller cares about.
#[derive(Clone, Copy, Debug)]
pub struct TimedSample {
    pub timestamp: f64,
    pub altitude: f64,
    pub valid: bool,
}

impl TimedSample {
    /// `valid` requires a numeric altitude inside the sanity bound and a
    /// timestamp strictly after the previous baseline; anything else is a
    /// stale or garbage sample the controller must not step on.
    pub fn new(timestamp: f64, altitude: f64, previous_timestamp: f64) -> Self {
        let valid = !altitude.is_nan()
            && altitude.abs() < MAX_SANE_ALTITUDE
            && timestamp > previous_timestamp;
        Self {
            timestamp,
            altitude,
            valid,
        }
    }
}

/// Altitude-hold control loop.
///
/// Owns the PID state and the motor seam for the duration of a session; the
/// telemetry socket is acquired in [`run`](Self::run) and released on every
/// exit path.
pub struct AltitudeHold<M> {
    config: Config,
    pid: Pid,
    motors: M,
    state: State,
    previous_timestamp: f64,
    command: f64,
}

impl<M: MotorOutput> AltitudeHold<M> {
    pub fn new(config: Config, motors: M) -> Self {
        let pid = Pid::new(config.gains);
        Self {
            config,
            pid,
            motors,
            state: State::Idle,
            previous_timestamp: 0.,
            command: 0.,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run one control session to completion.
    ///
    /// Connects to the telemetry peer, then ticks until the peer closes the
    /// stream or sends a negative-timestamp stop request; both end the
    /// session normally. Connection failures and configuration faults
    /// propagate; transient conditions (no frame yet, one bad sample) are
    /// absorbed here and never escape.
    pub async fn run(&mut self) -> Result<(), Error> {
        self.pid.reset();
        self.previous_timestamp = 0.;
        self.command = 0.;

        let mut channel = TelemetryChannel::connect(&self.config.host, self.config.port).await?;
        self.state = State::Running;
        info!(
            target_altitude = self.config.target_altitude,
            "altitude hold running"
        );

        let result = self.session(&mut channel).await;
        self.state = State::Stopped;
        result
        // `channel` drops here on every path, releasing the socket.
    }

    async fn session(&mut self, channel: &mut TelemetryChannel) -> Result<(), Error> {
        loop {
            let frame = match channel.recv_frame(self.config.frame_timeout).await {
                Ok(Some(frame)) => frame,
                // No new data this tick; yield and poll again.
                Ok(None) => {
                    sleep(IDLE_TICK).await;
                    continue;
                }
                Err(TelemetryError::ChannelClosed) => {
                    info!("telemetry peer closed the stream");
                    return Ok(());
                }
                Err(TelemetryError::MalformedFrame { got, expected }) => {
                    warn!(got, expected, "discarding partial telemetry frame");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if frame.timestamp() < 0. {
                info!("peer requested session stop");
                return Ok(());
            }

            self.tick(&frame)?;
        }
    }

    /// Process one received frame: gate it, step the PID if it is fresh and
    /// sane, and command the motors either way (an invalid sample holds the
    /// last command rather than cutting thrust).
    fn tick(&mut self, frame: &TelemetryFrame) -> Result<(), ControlError> {
        let sample = TimedSample::new(frame.timestamp(), frame.altitude(), self.previous_timestamp);

        if sample.valid {
            let dt = sample.timestamp - self.previous_timestamp;
            let correction = self
                .pid
                .step(self.config.target_altitude, sample.altitude, dt)?;
            self.command = correction.clamp(0., 1.);
            debug!(z = sample.altitude, u = self.command, "accepted sample");
        } else {
            warn!(
                t = sample.timestamp,
                z = sample.altitude,
                "rejected sample; holding last command"
            );
        }

        self.motors.set_motors(Vector4::repeat(self.command));
        self.previous_timestamp = sample.timestamp;
        Ok(())
    }
}
