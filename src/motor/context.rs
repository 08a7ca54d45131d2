use std::fmt;
use std::time::Instant;

use crate::control::{Controller, ControllerVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Active,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => f.write_str("manual"),
            Mode::Active => f.write_str("active"),
        }
    }
}

/// Everything the control tick and the mode transitions share.
///
/// Owned by a single `ControlLoop`; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub(crate) variant: ControllerVariant,
    pub(crate) controller: Option<Controller>,
    pub(crate) current_setpoint_cmd: u8,
    pub(crate) last_control_output_cmd: Option<u8>,
    pub(crate) last_tick_time: Instant,
    pub(crate) active: bool,
}

impl LoopContext {
    pub fn new(now: Instant) -> Self {
        Self {
            variant: ControllerVariant::None,
            controller: None,
            current_setpoint_cmd: 0,
            last_control_output_cmd: None,
            last_tick_time: now,
            active: false,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.active && self.controller.is_some() {
            Mode::Active
        } else {
            Mode::Manual
        }
    }

    pub fn variant(&self) -> ControllerVariant {
        self.variant
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    pub fn current_setpoint_cmd(&self) -> u8 {
        self.current_setpoint_cmd
    }

    pub fn last_control_output_cmd(&self) -> Option<u8> {
        self.last_control_output_cmd
    }

    pub fn last_tick_time(&self) -> Instant {
        self.last_tick_time
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Install a freshly built controller in one step
    pub(crate) fn commit_active(&mut self, controller: Controller, setpoint_cmd: u8, now: Instant) {
        self.variant = controller.variant();
        self.controller = Some(controller);
        self.current_setpoint_cmd = setpoint_cmd;
        self.last_tick_time = now;
        self.active = true;
    }

    /// Drop the controller and stop the loop. Hand-off state is kept.
    pub(crate) fn force_manual(&mut self) {
        self.variant = ControllerVariant::None;
        self.controller = None;
        self.active = false;
    }
}
