use std::fmt;
use std::time::Instant;

use crate::error::ParseError;

//wire grammar, ASCII and newline terminated
//out: s,<0-255>  i,<uint>  r  a,<0|1>  d,<0|1>
//in:  <dir>,<speedRpm>,<currentAmps>
pub const LINE_END: char = '\n';
pub const FIELD_SEP: char = ',';
pub const TELEMETRY_FIELDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction{
    #[default]
    Forward,
    Reverse,
}

impl Direction{
    //wire flag, shared by `d,<flag>` and the telemetry dir field
    pub fn as_flag(&self) -> u8{
        match self{
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }

    //only "1" and "0" are accepted; any other code (letters or e.g. "2")
    //drops the whole telemetry line
    pub fn from_flag(field: &str) -> Option<Self>{
        match field.trim(){
            "1" => Some(Direction::Forward),
            "0" => Some(Direction::Reverse),
            _ => None,
        }
    }
}

impl fmt::Display for Direction{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result{
        match self{
            Direction::Forward => f.write_str("forward"),
            Direction::Reverse => f.write_str("reverse"),
        }
    }
}

/// Everything the motor board understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand{
    SetSpeed(u8),
    SetSampling(u32),
    Reset,
    SetStreaming(bool),
    SetDirection(Direction),
}

impl MotorCommand{
    pub fn code(&self) -> char{
        match self{
            MotorCommand::SetSpeed(_) => 's',
            MotorCommand::SetSampling(_) => 'i',
            MotorCommand::Reset => 'r',
            MotorCommand::SetStreaming(_) => 'a',
            MotorCommand::SetDirection(_) => 'd',
        }
    }

    //bytes as written to the port, including the terminator
    pub fn encode(&self) -> String{
        format!("{}{}", self, LINE_END)
    }
}

impl fmt::Display for MotorCommand{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result{
        let code = self.code();
        match *self{
            MotorCommand::SetSpeed(v) => write!(f, "{}{}{}", code, FIELD_SEP, v),
            MotorCommand::SetSampling(v) => write!(f, "{}{}{}", code, FIELD_SEP, v),
            MotorCommand::Reset => write!(f, "{}", code),
            MotorCommand::SetStreaming(on) => write!(f, "{}{}{}", code, FIELD_SEP, on as u8),
            MotorCommand::SetDirection(dir) => write!(f, "{}{}{}", code, FIELD_SEP, dir.as_flag()),
        }
    }
}

/// One telemetry line from the board
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample{
    pub direction: Direction,
    pub speed_rpm: f64,
    pub current_amps: f64,
    pub received_at: Instant,
}

impl TelemetrySample{
    pub fn new(direction: Direction, speed_rpm: f64, current_amps: f64) -> Self{
        TelemetrySample{ direction, speed_rpm, current_amps, received_at: Instant::now() }
    }

    pub fn is_moving(&self) -> bool{
        self.speed_rpm != 0.0
    }
}

fn parse_number(field: &str) -> Result<f64, ParseError>{
    let trimmed = field.trim();
    match trimmed.parse::<f64>(){
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::BadNumber(trimmed.to_string())),
    }
}

/// Parse `<dir>,<speedRpm>,<currentAmps>`. Surrounding whitespace and `\r` are ignored.
pub fn parse_telemetry_line(line: &str, received_at: Instant) -> Result<TelemetrySample, ParseError>{
    let fields: Vec<&str> = line.trim().split(FIELD_SEP).collect();
    if fields.len() != TELEMETRY_FIELDS{
        return Err(ParseError::FieldCount(fields.len()));
    }

    let direction = Direction::from_flag(fields[0])
        .ok_or_else(|| ParseError::BadDirection(fields[0].trim().to_string()))?;
    let speed_rpm = parse_number(fields[1])?;
    let current_amps = parse_number(fields[2])?;

    Ok(TelemetrySample{ direction, speed_rpm, current_amps, received_at })
}
