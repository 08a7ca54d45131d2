pub mod context;
pub mod controller;
pub mod mode;
pub mod request;
pub mod scheduler;

pub use context::{LoopContext, Mode};
pub use controller::{ControlStatus, MotorController};
pub use request::{Request, HELP};
pub use scheduler::{ControlLoop, TickOutcome};
