//! Console logger for the `log` facade.
//!
//! Lines go to stderr so they do not interleave with the console prompt:
//!
//! ```text
//! INFO [2s 105ms] motor_link::motor::mode - PI control engaged at s,80
//! WARN [9s 3ms] motor_link::uart - reader stopped: broken pipe
//! ```

use std::io::Write;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use humantime::format_duration;
use log::{LevelFilter, Metadata, Record, SetLoggerError};

pub struct ConsoleLogger {
    started: Instant,
}

impl ConsoleLogger {
    fn new() -> Self {
        Self { started: Instant::now() }
    }

    /// Time since init, truncated to milliseconds
    fn uptime(&self) -> Duration {
        let elapsed = self.started.elapsed();
        Duration::from_millis(elapsed.as_millis() as u64)
    }

    fn format(&self, record: &Record) -> String {
        format!(
            "{} [{}] {} - {}\n",
            record.level(),
            format_duration(self.uptime()),
            record.target(),
            record.args()
        )
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let line = self.format(record);
            let _ = std::io::stderr().lock().write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ConsoleLogger> = OnceLock::new();

/// Install the console logger. Fails if a logger is already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(ConsoleLogger::new);
    log::set_logger(logger).map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let logger = ConsoleLogger::new();
        let line = logger.format(
            &Record::builder()
                .args(format_args!("link open"))
                .level(log::Level::Info)
                .target("motor_link::uart")
                .build(),
        );
        assert!(line.starts_with("INFO ["));
        assert!(line.ends_with("] motor_link::uart - link open\n"));
    }

    #[test]
    fn test_init_twice_fails() {
        let _ = init(LevelFilter::Warn);
        assert!(init(LevelFilter::Warn).is_err());
    }
}
