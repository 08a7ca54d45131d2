/**
 * Control Module
 *
 * Pure numeric core: the feedback controllers and the mapping between
 * command units (0-255) and physical units (RPM).
 */

pub mod controller;
pub mod units;

pub use controller::{Controller, ControllerParameters, ControllerState, ControllerVariant, Gains};
pub use units::{parse_command, validate_command, UnitConverter, MAX_COMMAND};
