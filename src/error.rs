use crate::control::ControlError;
use crate::telemetry::TelemetryError;
use thiserror::Error;

/// Top-level error for a control session.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Control(#[from] ControlError),
}
