/**
 * Control loop tick
 *
 * Runs once per timer period: latest telemetry -> controller -> command
 * units -> clamp -> safety override -> SetSpeed.
 */

use std::time::Instant;

use log::{debug, warn};

use super::context::{LoopContext, Mode};
use crate::config::MotorConfig;
use crate::control::{Controller, ControllerParameters, ControllerVariant, UnitConverter};
use crate::error::MotorError;
use crate::ring_buffer::TelemetryBuffer;
use crate::uart::{CommandSink, MotorCommand};

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Loop inactive, manual mode, link down, or no telemetry yet
    Idle,
    /// Clock did not advance since the previous tick
    Skipped,
    /// `SetSpeed(output)` was written
    Commanded { output: u8, overridden: bool },
}

/// Single owner of the `LoopContext`. Mode transitions live in `mode.rs`.
pub struct ControlLoop {
    pub(crate) ctx: LoopContext,
    pub(crate) config: MotorConfig,
    pub(crate) converter: UnitConverter,
}

impl ControlLoop {
    pub fn new(config: MotorConfig, now: Instant) -> Self {
        Self {
            ctx: LoopContext::new(now),
            converter: UnitConverter::new(config.scale),
            config,
        }
    }

    pub fn context(&self) -> &LoopContext {
        &self.ctx
    }

    pub fn mode(&self) -> Mode {
        self.ctx.mode()
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub(crate) fn build_controller(&self, variant: ControllerVariant, setpoint_cmd: u8) -> Option<Controller> {
        let params = ControllerParameters {
            gains: self.config.gains,
            setpoint: self.converter.to_physical(setpoint_cmd as f64),
        };
        Controller::new(variant, params).map(|c| c.with_integral_limit(self.config.integral_limit))
    }

    /// Final command for a controller correction given in RPM
    pub fn output_command(&self, correction_rpm: f64, speed_rpm: f64) -> (u8, bool) {
        let raw = self.ctx.current_setpoint_cmd as f64 + self.converter.to_command(correction_rpm);
        let output = UnitConverter::clamp_command(raw);

        //never cut to zero while the motor is still turning
        if output == 0 && speed_rpm > self.config.safety_speed_rpm {
            return (self.config.safety_floor_cmd, true);
        }
        (output, false)
    }

    pub fn tick_at(&mut self, now: Instant, buffer: &TelemetryBuffer, sink: &dyn CommandSink) -> Result<TickOutcome, MotorError> {
        if !self.ctx.active || self.ctx.controller.is_none() || !sink.is_connected() {
            return Ok(TickOutcome::Idle);
        }

        let sample = match buffer.latest() {
            Some(sample) => sample,
            None => return Ok(TickOutcome::Idle),
        };

        let dt = now.saturating_duration_since(self.ctx.last_tick_time).as_secs_f64();
        self.ctx.last_tick_time = now;
        if dt <= 0.0 {
            return Ok(TickOutcome::Skipped);
        }

        let computed = match self.ctx.controller.as_mut() {
            Some(controller) => controller.compute(sample.speed_rpm, dt),
            None => return Ok(TickOutcome::Idle),
        };
        let correction = match computed {
            Ok(correction) => correction,
            Err(e) => {
                warn!("controller failed ({}), switching to manual", e);
                self.ctx.force_manual();
                return Err(e.into());
            }
        };

        let (output, overridden) = self.output_command(correction, sample.speed_rpm);
        self.ctx.last_control_output_cmd = Some(output);
        debug!(
            "tick dt={:.3}s pv={:.1}rpm correction={:.2}rpm -> s,{}{}",
            dt, sample.speed_rpm, correction, output,
            if overridden { " (safety floor)" } else { "" }
        );

        if let Err(e) = sink.send(MotorCommand::SetSpeed(output)) {
            warn!("control write failed ({}), switching to manual", e);
            self.ctx.force_manual();
            return Err(e.into());
        }

        Ok(TickOutcome::Commanded { output, overridden })
    }
}
