//! # altitude-hold
//! An altitude-hold controller for a multirotor reachable over a socket.
//!
//! The crate closes a feedback loop between a telemetry source (a flight
//! simulator or vehicle pushing fixed-layout state frames over TCP) and a
//! motor throttle command.
//!
//! # Components
//! [`TelemetryChannel`] owns the connection to the telemetry peer and decodes
//! incoming byte frames into [`TelemetryFrame`] values.
//!
//! [`Pid`] is the control law: altitude error in, unclamped correction out.
//!
//! [`AltitudeHold`] is the session loop: it pulls telemetry, gates stale or
//! insane samples, steps the PID on the telemetry clock, clamps the result to
//! `[0, 1]` and broadcasts it to the motors.
//!
//! [`MotorOutput`](hal::MotorOutput) is the seam to the actuator; implement it
//! for whatever actually drives the four motors.

pub mod control;
pub use control::{ControlError, Gains, Pid};

pub mod copter;
pub use copter::{AltitudeHold, Config, State, TimedSample};

mod error;
pub use error::Error;

pub mod hal;
pub use hal::MotorOutput;

pub mod telemetry;
pub use telemetry::{TelemetryChannel, TelemetryError, TelemetryFrame};
