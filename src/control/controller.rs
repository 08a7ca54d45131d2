/**
 * Feedback controllers
 *
 * P, PI and PID over physical units (RPM). Error is `setpoint - pv`.
 * The integral is unbounded unless an explicit limit is configured.
 */

use std::fmt;
use std::str::FromStr;

use crate::error::{ControllerError, ValidationError};

/// Which controller drives the motor. `None` is manual control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerVariant {
    #[default]
    None,
    P,
    PI,
    PID,
}

impl ControllerVariant {
    pub fn is_manual(&self) -> bool {
        *self == ControllerVariant::None
    }

    fn accumulates(&self) -> bool {
        matches!(self, ControllerVariant::PI | ControllerVariant::PID)
    }
}

impl fmt::Display for ControllerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerVariant::None => "none",
            ControllerVariant::P => "p",
            ControllerVariant::PI => "pi",
            ControllerVariant::PID => "pid",
        };
        f.write_str(name)
    }
}

impl FromStr for ControllerVariant {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "manual" | "off" => Ok(ControllerVariant::None),
            "p" => Ok(ControllerVariant::P),
            "pi" => Ok(ControllerVariant::PI),
            "pid" => Ok(ControllerVariant::PID),
            other => Err(ValidationError::UnknownVariant(other.to_string())),
        }
    }
}

/// Controller gains. `ki` is ignored by P, `kd` by P and PI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self { kp: 0.5, ki: 0.1, kd: 0.01 }
    }
}

/// Gains plus setpoint, fixed for the life of a controller instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerParameters {
    pub gains: Gains,
    /// Always in RPM
    pub setpoint: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub previous_error: f64,
    pub integral: f64,
}

#[derive(Debug, Clone)]
pub struct Controller {
    variant: ControllerVariant,
    params: ControllerParameters,
    /// Present only for PI and PID
    state: Option<ControllerState>,
    integral_limit: Option<f64>,
}

impl Controller {
    /// Build a controller with zeroed state. Returns `None` for the manual variant.
    pub fn new(variant: ControllerVariant, params: ControllerParameters) -> Option<Self> {
        if variant.is_manual() {
            return None;
        }

        Some(Self {
            variant,
            params,
            state: variant.accumulates().then(ControllerState::default),
            integral_limit: None,
        })
    }

    pub fn with_integral_limit(mut self, limit: Option<f64>) -> Self {
        self.integral_limit = limit.map(f64::abs);
        self
    }

    pub fn variant(&self) -> ControllerVariant {
        self.variant
    }

    pub fn setpoint(&self) -> f64 {
        self.params.setpoint
    }

    pub fn params(&self) -> &ControllerParameters {
        &self.params
    }

    pub fn state(&self) -> Option<&ControllerState> {
        self.state.as_ref()
    }

    /// Move to a new setpoint and clear the accumulators
    pub fn retune(&mut self, setpoint: f64) {
        self.params.setpoint = setpoint;
        if let Some(state) = self.state.as_mut() {
            *state = ControllerState::default();
        }
    }

    /// Correction in RPM for one step of length `dt` seconds.
    ///
    /// State is only written when the output is finite, so a failed call
    /// leaves the controller exactly as it was.
    pub fn compute(&mut self, process_variable: f64, dt: f64) -> Result<f64, ControllerError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ControllerError::InvalidDt(dt));
        }

        let gains = self.params.gains;
        let error = self.params.setpoint - process_variable;
        let mut output = gains.kp * error;

        let next_state = match self.state {
            Some(state) => {
                let mut integral = state.integral + error * dt;
                if let Some(limit) = self.integral_limit {
                    integral = integral.clamp(-limit, limit);
                }
                output += gains.ki * integral;

                if self.variant == ControllerVariant::PID {
                    let derivative = (error - state.previous_error) / dt;
                    output += gains.kd * derivative;
                }

                Some(ControllerState { previous_error: error, integral })
            }
            None => None,
        };

        if !output.is_finite() {
            return Err(ControllerError::NonFinite);
        }

        self.state = next_state;
        Ok(output)
    }
}
