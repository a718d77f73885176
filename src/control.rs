//! Altitude PID control law.
//!
//! [`Pid`] is deliberately just the law: given a target, a measurement and
//! the elapsed time it returns the raw correction. Clamping the output to an
//! actuator-safe range is the caller's policy, not the controller's.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Gains must be finite and non-negative; a negative gain inverts the
    /// loop and drives it unstable.
    #[error("invalid {name} gain {value}: gains must be finite and non-negative")]
    InvalidGain { name: &'static str, value: f64 },

    /// The derivative term is undefined for a non-advancing clock; the
    /// caller must skip ticks where time has not moved forward.
    #[error("non-positive time step {dt}: the sample clock must advance between steps")]
    NonPositiveDt { dt: f64 },
}

/// Proportional, integral and derivative loop gains.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Result<Self, ControlError> {
        for (name, value) in [("proportional", kp), ("integral", ki), ("derivative", kd)] {
            if !value.is_finite() || value < 0. {
                return Err(ControlError::InvalidGain { name, value });
            }
        }
        Ok(Self { kp, ki, kd })
    }
}

/// Stateful PID controller.
///
/// State persists across steps for the lifetime of a control session and is
/// reset only at session start. The integrator is not clamped, matching the
/// minimal controller this reimplements; under sustained saturation it will
/// wind up, a known instability risk.
#[derive(Clone, Debug)]
pub struct Pid {
    gains: Gains,
    previous_error: f64,
    integrator: f64,
}

impl Pid {
    pub fn new(gains: Gains) -> Self {
        Self {
            gains,
            previous_error: 0.,
            integrator: 0.,
        }
    }

    /// Advance the controller by one accepted sample.
    ///
    /// `dt` is the elapsed time since the previous accepted sample and must
    /// be positive; a zero or negative step fails with
    /// [`ControlError::NonPositiveDt`] without touching controller state.
    ///
    /// The returned correction is unclamped.
    pub fn step(&mut self, target: f64, measured: f64, dt: f64) -> Result<f64, ControlError> {
        if !(dt > 0.) || !dt.is_finite() {
            return Err(ControlError::NonPositiveDt { dt });
        }

        let error = target - measured;
        let derivative = (error - self.previous_error) / dt;
        self.integrator += error * dt;
        self.previous_error = error;

        Ok(self.gains.kp * error + self.gains.kd * derivative + self.gains.ki * self.integrator)
    }

    /// Clear the error and integrator state for a new session.
    pub fn reset(&mut self) {
        self.previous_error = 0.;
        self.integrator = 0.;
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }
}
