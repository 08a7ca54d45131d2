use crate::control::{parse_command, ControllerVariant};
use crate::error::ValidationError;
use crate::uart::{Direction, MotorCommand};

/// A parsed operator request, dispatched on its tag by `MotorController::dispatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect(Option<String>),
    Disconnect,
    /// Raw board command. `SetSpeed` goes through the manual speed path.
    Motor(MotorCommand),
    Mode { variant: ControllerVariant, setpoint: Option<i64> },
    Status,
    Help,
    Quit,
}

fn parse_flag(text: &str) -> Result<bool, ValidationError> {
    match text.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ValidationError::NotNumeric(other.to_string())),
    }
}

fn parse_sampling(text: &str) -> Result<u32, ValidationError> {
    let trimmed = text.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| ValidationError::NotNumeric(trimmed.to_string()))
}

fn parse_setpoint(text: &str) -> Result<i64, ValidationError> {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| ValidationError::NotNumeric(trimmed.to_string()))
}

impl Request {
    /// Parse one console line.
    ///
    /// Accepts the wire forms (`s,120`, `i,50`, `r`, `a,1`, `d,0`), their
    /// spelled-out aliases, and `mode <none|p|pi|pid> [setpoint]`.
    /// Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Request>, ValidationError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (head, rest) = match line.split_once(|c: char| c == ',' || c.is_whitespace()) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        let request = match head.to_ascii_lowercase().as_str() {
            "s" | "speed" => Request::Motor(MotorCommand::SetSpeed(parse_command(rest)?)),
            "i" | "sampling" => Request::Motor(MotorCommand::SetSampling(parse_sampling(rest)?)),
            "r" | "reset" => Request::Motor(MotorCommand::Reset),
            "a" | "stream" => Request::Motor(MotorCommand::SetStreaming(parse_flag(rest)?)),
            "d" | "direction" => {
                let dir = if parse_flag(rest)? { Direction::Forward } else { Direction::Reverse };
                Request::Motor(MotorCommand::SetDirection(dir))
            }
            "mode" => {
                let mut parts = rest.split_whitespace();
                let variant = parts
                    .next()
                    .ok_or_else(|| ValidationError::UnknownVariant(String::new()))?
                    .parse::<ControllerVariant>()?;
                let setpoint = parts.next().map(parse_setpoint).transpose()?;
                Request::Mode { variant, setpoint }
            }
            "connect" => Request::Connect((!rest.is_empty()).then(|| rest.to_string())),
            "disconnect" => Request::Disconnect,
            "status" | "?" => Request::Status,
            "help" | "h" => Request::Help,
            "quit" | "exit" | "x" => Request::Quit,
            other => return Err(ValidationError::UnknownCommand(other.to_string())),
        };
        Ok(Some(request))
    }
}

pub const HELP: &str = "\
  s,<0-255>            set motor speed (retargets automatic control)
  i,<ms>               telemetry sampling interval
  a,<0|1>              telemetry streaming off/on
  d,<0|1>              direction reverse/forward
  r                    reset encoder, back to manual
  mode <none|p|pi|pid> [setpoint]
  connect [port] | disconnect | status | quit";
