use std::io;
use thiserror::Error;

/// Failures of the serial link itself
#[derive(Debug, Error)]
pub enum PortError{
    #[error("failed to open port {port}: {source}")]
    Open{
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to clone port handle: {0}")]
    Clone(#[source] io::Error),
    #[error("failed to start link thread: {0}")]
    Thread(#[source] io::Error),
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),
    #[error("serial port is not connected")]
    NotConnected,
    #[error("command writer has stopped")]
    WriterStopped,
}

/// Why a telemetry line was dropped. Never surfaced past the reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError{
    #[error("expected 3 fields, got {0}")]
    FieldCount(usize),
    #[error("unknown direction {0:?}")]
    BadDirection(String),
    #[error("non-numeric field {0:?}")]
    BadNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ControllerError{
    #[error("time step must be positive and finite, got {0}")]
    InvalidDt(f64),
    #[error("controller produced a non-finite output")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError{
    #[error("{value} is outside the command range 0-{max}")]
    OutOfRange{ value: i64, max: i64 },
    #[error("{0:?} is not a valid number")]
    NotNumeric(String),
    #[error("unknown controller mode {0:?}")]
    UnknownVariant(String),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModeTransitionError{
    #[error("motor is already spinning at {speed_rpm} RPM, supply an initial speed before enabling control")]
    MustSupplyInitialSpeed{ speed_rpm: f64 },
    #[error("a speed (0-255) is required to start automatic control")]
    SpeedRequired,
}

/// Every error the core reports to its caller
#[derive(Debug, Error)]
pub enum MotorError{
    #[error("communication error: {0}")]
    Communication(#[from] PortError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    ModeTransition(#[from] ModeTransitionError),
}

impl MotorError{
    /// True when the link is unusable and the caller should tear it down
    pub fn is_communication(&self) -> bool{
        matches!(self, MotorError::Communication(_))
    }
}
