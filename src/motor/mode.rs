/**
 * Mode transitions
 *
 * Manual <-> Active hand-off. Every transition resolves its setpoint and
 * builds the new controller first, and only then touches the context, so
 * a rejected request leaves everything as it was.
 */

use std::time::Instant;

use log::{info, warn};

use super::context::Mode;
use super::scheduler::ControlLoop;
use crate::control::{validate_command, ControllerVariant, UnitConverter};
use crate::error::{ModeTransitionError, MotorError};
use crate::ring_buffer::TelemetryBuffer;
use crate::uart::{CommandSink, MotorCommand, TelemetrySample};

impl ControlLoop {
    /// Switch controller variant. `ControllerVariant::None` returns to manual.
    pub fn select_mode(
        &mut self,
        variant: ControllerVariant,
        explicit_setpoint: Option<i64>,
        now: Instant,
        buffer: &TelemetryBuffer,
        sink: &dyn CommandSink,
    ) -> Result<Mode, MotorError> {
        match (self.mode(), variant.is_manual()) {
            (Mode::Manual, true) => Ok(Mode::Manual),
            (Mode::Manual, false) => self.engage(variant, explicit_setpoint, now, buffer, sink),
            (Mode::Active, true) => self.release(explicit_setpoint, buffer, sink),
            (Mode::Active, false) => self.switch_variant(variant, explicit_setpoint, now),
        }
    }

    fn engage(
        &mut self,
        variant: ControllerVariant,
        explicit_setpoint: Option<i64>,
        now: Instant,
        buffer: &TelemetryBuffer,
        sink: &dyn CommandSink,
    ) -> Result<Mode, MotorError> {
        let explicit = explicit_setpoint.map(validate_command).transpose()?;

        let setpoint = match explicit.or_else(|| self.positive_last_output()) {
            Some(setpoint) => setpoint,
            None => {
                return Err(match buffer.latest() {
                    Some(sample) if sample.is_moving() => {
                        ModeTransitionError::MustSupplyInitialSpeed { speed_rpm: sample.speed_rpm }
                    }
                    _ => ModeTransitionError::SpeedRequired,
                }
                .into());
            }
        };

        let controller = match self.build_controller(variant, setpoint) {
            Some(controller) => controller,
            None => return Ok(self.mode()),
        };
        sink.send(MotorCommand::SetSpeed(setpoint))?;

        self.ctx.commit_active(controller, setpoint, now);
        info!("{} control engaged at s,{}", variant, setpoint);
        Ok(Mode::Active)
    }

    fn switch_variant(&mut self, variant: ControllerVariant, explicit_setpoint: Option<i64>, now: Instant) -> Result<Mode, MotorError> {
        let explicit = explicit_setpoint.map(validate_command).transpose()?;
        let setpoint = explicit
            .or_else(|| self.positive_last_output())
            .unwrap_or(self.ctx.current_setpoint_cmd);

        if let Some(controller) = self.build_controller(variant, setpoint) {
            self.ctx.commit_active(controller, setpoint, now);
            info!("switched to {} control at s,{}", variant, setpoint);
        }
        Ok(Mode::Active)
    }

    fn release(&mut self, explicit_setpoint: Option<i64>, buffer: &TelemetryBuffer, sink: &dyn CommandSink) -> Result<Mode, MotorError> {
        let hold = self.hold_speed(explicit_setpoint, buffer.latest().as_ref());
        let sent = sink.send(MotorCommand::SetSpeed(hold));

        self.ctx.force_manual();
        self.ctx.current_setpoint_cmd = hold;
        info!("automatic control released, holding s,{}", hold);

        sent?;
        Ok(Mode::Manual)
    }

    /// Speed to keep the motor at when leaving automatic control.
    ///
    /// Priority: current setpoint, explicit value, telemetry, default. While the
    /// latest sample shows motion the result is never below `min_hold_cmd`.
    pub fn hold_speed(&self, explicit_setpoint: Option<i64>, latest: Option<&TelemetrySample>) -> u8 {
        let hold = if self.ctx.current_setpoint_cmd > 0 {
            self.ctx.current_setpoint_cmd
        } else if let Some(valid) = explicit_setpoint.and_then(|v| validate_command(v).ok()) {
            valid
        } else {
            match latest {
                Some(sample) => {
                    let derived = UnitConverter::clamp_command(self.converter.to_command(sample.speed_rpm.abs()));
                    derived.max(self.config.min_hold_cmd)
                }
                None => self.config.default_hold_cmd,
            }
        };

        match latest {
            Some(sample) if sample.is_moving() => hold.max(self.config.min_hold_cmd),
            _ => hold,
        }
    }

    /// Manual speed request. While active this retargets the controller.
    pub fn manual_speed(&mut self, value: i64, now: Instant, sink: &dyn CommandSink) -> Result<u8, MotorError> {
        let speed = validate_command(value)?;

        let retuned = if self.mode() == Mode::Active {
            self.build_controller(self.ctx.variant, speed)
        } else {
            None
        };

        if let Err(e) = sink.send(MotorCommand::SetSpeed(speed)) {
            if self.ctx.active {
                warn!("speed write failed ({}), switching to manual", e);
                self.ctx.force_manual();
            }
            return Err(e.into());
        }

        match retuned {
            Some(controller) => {
                self.ctx.commit_active(controller, speed, now);
                info!("setpoint moved to s,{}", speed);
            }
            None => self.ctx.current_setpoint_cmd = speed,
        }
        Ok(speed)
    }

    /// Encoder reset: always ends in manual, no speed hand-off
    pub fn reset(&mut self, sink: &dyn CommandSink) -> Result<(), MotorError> {
        let sent = sink.send(MotorCommand::Reset);

        self.ctx.force_manual();
        self.ctx.current_setpoint_cmd = 0;
        self.ctx.last_control_output_cmd = None;
        info!("reset, control loop disabled");

        sent.map_err(MotorError::from)
    }

    /// Link lost or closed
    pub fn disable(&mut self) {
        if self.ctx.active {
            warn!("control loop disabled");
        }
        self.ctx.force_manual();
    }

    fn positive_last_output(&self) -> Option<u8> {
        self.ctx.last_control_output_cmd.filter(|&v| v > 0)
    }
}
