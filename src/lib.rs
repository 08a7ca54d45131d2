pub mod config;
pub mod control;
pub mod error;
pub mod logger;
pub mod motor;
pub mod ring_buffer;
pub mod uart;
pub mod ffi;

#[cfg(feature = "python")]
pub mod python;

pub use config::MotorConfig;
pub use control::{Controller, ControllerParameters, ControllerState, ControllerVariant, Gains, UnitConverter};
pub use error::{ControllerError, ModeTransitionError, MotorError, ParseError, PortError, ValidationError};
pub use motor::{ControlStatus, Mode, MotorController, Request, TickOutcome};
pub use ring_buffer::{RingBuffer, TelemetryBuffer};
pub use uart::{CommandSink, Direction, MotorCommand, SerialTransport, TelemetrySample};
