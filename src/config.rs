/**
 * Runtime configuration
 *
 * Every tunable constant of the link and the control loop lives here.
 * Defaults reproduce the bench setup: 115200 baud, 50 ms control tick,
 * 100 ms device settle time, 1 command unit per 100 RPM.
 */

use std::time::Duration;

use crate::control::Gains;

pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;
pub const DEFAULT_SCALE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct MotorConfig {
    pub baud_rate: u32,
    /// Period of the control tick
    pub loop_period: Duration,
    /// Minimum gap the device needs between two commands
    pub settle_delay: Duration,
    /// Reader sleep when no bytes are waiting
    pub poll_interval: Duration,
    pub buffer_capacity: usize,
    /// Command units per RPM
    pub scale: f64,
    pub gains: Gains,
    /// Anti-windup bound on the integral term. `None` keeps it unbounded.
    pub integral_limit: Option<f64>,
    /// Speed above which the motor counts as still spinning
    pub safety_speed_rpm: f64,
    /// Command substituted for a zero output while still spinning
    pub safety_floor_cmd: u8,
    /// Lowest hold speed derived from telemetry when leaving automatic control
    pub min_hold_cmd: u8,
    /// Hold speed when leaving automatic control with no telemetry at all
    pub default_hold_cmd: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
            loop_period: Duration::from_millis(50),
            settle_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            scale: DEFAULT_SCALE,
            gains: Gains::default(),
            integral_limit: None,
            safety_speed_rpm: 5.0,
            safety_floor_cmd: 10,
            min_hold_cmd: 30,
            default_hold_cmd: 50,
        }
    }
}

impl MotorConfig {
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn with_loop_period(mut self, period: Duration) -> Self {
        self.loop_period = period;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_gains(mut self, gains: Gains) -> Self {
        self.gains = gains;
        self
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = Some(limit.abs());
        self
    }
}
