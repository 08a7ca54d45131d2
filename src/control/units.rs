use crate::config::DEFAULT_SCALE;
use crate::error::ValidationError;

/// Highest value the motor accepts for `s,<value>`
pub const MAX_COMMAND: u8 = 255;

/// Converts between command units and RPM with a fixed scale.
/// With the default 0.01, one command unit is 100 RPM.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    scale: f64,
}

impl UnitConverter {
    pub const fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn to_physical(&self, cmd_units: f64) -> f64 {
        cmd_units / self.scale
    }

    pub fn to_command(&self, physical: f64) -> f64 {
        physical * self.scale
    }

    /// Round and saturate into the command range
    pub fn clamp_command(value: f64) -> u8 {
        if value.is_nan() {
            return 0;
        }
        value.round().clamp(0.0, MAX_COMMAND as f64) as u8
    }
}

/// Accept a raw command value only if it lies in 0-255
pub fn validate_command(value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value).map_err(|_| ValidationError::OutOfRange { value, max: MAX_COMMAND as i64 })
}

/// Parse user text as a command value, e.g. the speed field of a console
pub fn parse_command(text: &str) -> Result<u8, ValidationError> {
    let trimmed = text.trim();
    let value = trimmed
        .parse::<i64>()
        .map_err(|_| ValidationError::NotNumeric(trimmed.to_string()))?;
    validate_command(value)
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion() {
        let conv = UnitConverter::default();
        assert!((conv.to_physical(10.0) - 1000.0).abs() < 1e-9);
        assert!((conv.to_command(2500.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_full_range() {
        let conv = UnitConverter::default();
        for x in 0..=255u8 {
            let back = conv.to_command(conv.to_physical(x as f64));
            assert!((back - x as f64).abs() < 1e-9, "{} came back as {}", x, back);
        }
    }

    #[test]
    fn test_validate_command() {
        assert_eq!(validate_command(0), Ok(0));
        assert_eq!(validate_command(255), Ok(255));
        assert_eq!(validate_command(256), Err(ValidationError::OutOfRange { value: 256, max: 255 }));
        assert!(validate_command(-1).is_err());
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" 120 "), Ok(120));
        assert_eq!(parse_command("12a"), Err(ValidationError::NotNumeric("12a".to_string())));
        assert_eq!(parse_command(""), Err(ValidationError::NotNumeric(String::new())));
        assert!(parse_command("300").is_err());
    }

    #[test]
    fn test_clamp_command() {
        assert_eq!(UnitConverter::clamp_command(-12.0), 0);
        assert_eq!(UnitConverter::clamp_command(12.4), 12);
        assert_eq!(UnitConverter::clamp_command(12.5), 13);
        assert_eq!(UnitConverter::clamp_command(1e9), 255);
        assert_eq!(UnitConverter::clamp_command(f64::NAN), 0);
    }
}
