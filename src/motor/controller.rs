/**
 * Motor Controller
 *
 * Facade the presentation layer talks to:
 * 1. Opens the serial link (reader + writer threads)
 * 2. Owns the control loop and its mode state machine
 * 3. Runs the periodic control tick in a background thread
 * 4. Tears the link down safely on request or on write failure
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use log::{info, warn};

use super::context::Mode;
use super::request::Request;
use super::scheduler::{ControlLoop, TickOutcome};
use crate::config::MotorConfig;
use crate::control::ControllerVariant;
use crate::error::{MotorError, PortError};
use crate::ring_buffer::TelemetryBuffer;
use crate::uart::{MotorCommand, SerialLink, SerialTransport, TelemetrySample};

/// Snapshot of the control state for display
#[derive(Debug, Clone, PartialEq)]
pub struct ControlStatus {
    pub connected: bool,
    pub mode: Mode,
    pub variant: ControllerVariant,
    pub setpoint_cmd: u8,
    pub last_output_cmd: Option<u8>,
    pub dropped_lines: u64,
    pub latest: Option<TelemetrySample>,
}

pub struct MotorController {
    port_name: String,
    config: MotorConfig,
    buffer: Arc<TelemetryBuffer>,
    transport: SerialTransport,
    control: Mutex<ControlLoop>,
    running: Arc<AtomicBool>,
}

impl MotorController {
    pub fn new(port_name: &str) -> Self {
        Self::with_config(port_name, MotorConfig::default())
    }

    pub fn with_config(port_name: &str, config: MotorConfig) -> Self {
        let buffer = Arc::new(TelemetryBuffer::new(config.buffer_capacity));
        let transport = SerialTransport::new(Arc::clone(&buffer), config.settle_delay, config.poll_interval);

        Self {
            port_name: port_name.to_string(),
            control: Mutex::new(ControlLoop::new(config.clone(), Instant::now())),
            config,
            buffer,
            transport,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn control(&self) -> MutexGuard<'_, ControlLoop> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Open the configured port and start reading telemetry
    pub fn connect(&self) -> Result<(), MotorError> {
        self.connect_port(&self.port_name)
    }

    /// Open another port. Any current link is torn down first.
    pub fn connect_port(&self, port_name: &str) -> Result<(), MotorError> {
        self.close_previous();
        self.transport.open(port_name, self.config.baud_rate)?;
        Ok(())
    }

    /// Run over an already opened link instead of a named port
    pub fn connect_link(&self, link: Box<dyn SerialLink>) -> Result<(), MotorError> {
        self.close_previous();
        self.transport.connect(link)?;
        Ok(())
    }

    //a new link always starts in manual
    fn close_previous(&self) {
        if let Err(e) = self.disconnect() {
            warn!("previous link did not close cleanly: {}", e);
        }
    }

    /// Disable the loop, stop the motor, stop streaming, close the port.
    /// Best effort: every step runs, the first failure is returned.
    pub fn disconnect(&self) -> Result<(), MotorError> {
        self.control().disable();
        self.transport.disconnect()?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn on_error<T>(&self, result: Result<T, MotorError>) -> Result<T, MotorError> {
        if let Err(MotorError::Communication(e)) = &result {
            if !matches!(e, PortError::NotConnected) {
                warn!("link failure ({}), disconnecting", e);
                if let Err(e) = self.disconnect() {
                    warn!("disconnect after failure: {}", e);
                }
            }
        }
        result
    }

    pub fn select_controller_mode(&self, variant: ControllerVariant, explicit_setpoint: Option<i64>) -> Result<Mode, MotorError> {
        let result = self
            .control()
            .select_mode(variant, explicit_setpoint, Instant::now(), &self.buffer, &self.transport);
        self.on_error(result)
    }

    pub fn manual_speed_command(&self, value: i64) -> Result<u8, MotorError> {
        let result = self.control().manual_speed(value, Instant::now(), &self.transport);
        self.on_error(result)
    }

    pub fn reset(&self) -> Result<(), MotorError> {
        let result = self.control().reset(&self.transport);
        self.on_error(result)
    }

    /// Sampling, streaming and direction. Speed and reset go through the
    /// control loop so its state stays in step with the board.
    pub fn send_command(&self, command: MotorCommand) -> Result<(), MotorError> {
        match command {
            MotorCommand::SetSpeed(speed) => self.manual_speed_command(speed as i64).map(|_| ()),
            MotorCommand::Reset => self.reset(),
            other => {
                let result = self.transport.write(other).map_err(MotorError::from);
                self.on_error(result)
            }
        }
    }

    /// Latest sample and its epoch; the epoch changes when a new one lands
    pub fn on_telemetry_sample(&self) -> Option<(TelemetrySample, u64)> {
        self.buffer.latest_with_epoch()
    }

    pub fn telemetry_snapshot(&self) -> Vec<TelemetrySample> {
        self.buffer.snapshot()
    }

    pub fn mode(&self) -> Mode {
        self.control().mode()
    }

    pub fn status(&self) -> ControlStatus {
        let control = self.control();
        let ctx = control.context();
        ControlStatus {
            connected: self.transport.is_connected(),
            mode: ctx.mode(),
            variant: ctx.variant(),
            setpoint_cmd: ctx.current_setpoint_cmd(),
            last_output_cmd: ctx.last_control_output_cmd(),
            dropped_lines: self.transport.dropped_lines(),
            latest: self.buffer.latest(),
        }
    }

    pub fn tick(&self) -> Result<TickOutcome, MotorError> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&self, now: Instant) -> Result<TickOutcome, MotorError> {
        let result = self.control().tick_at(now, &self.buffer, &self.transport);
        self.on_error(result)
    }

    /// Apply one parsed request. Status, help and quit belong to the caller.
    pub fn dispatch(&self, request: Request) -> Result<(), MotorError> {
        match request {
            Request::Connect(None) => self.connect(),
            Request::Connect(Some(port)) => self.connect_port(&port),
            Request::Disconnect => self.disconnect(),
            Request::Motor(command) => self.send_command(command),
            Request::Mode { variant, setpoint } => self.select_controller_mode(variant, setpoint).map(|_| ()),
            Request::Status | Request::Help | Request::Quit => Ok(()),
        }
    }

    /// Start the periodic control tick in a background thread
    pub fn start_background(self: Arc<Self>) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let controller = Arc::clone(&self);
        thread::spawn(move || controller.run_timer())
    }

    fn run_timer(&self) {
        let period = self.config.loop_period;
        info!("control timer started, period {:?}", period);

        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            if let Err(e) = self.tick_at(started) {
                warn!("control tick: {}", e);
            }
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        info!("control timer stopped");
    }

    /// Stop the background timer. Returns after the current tick at the latest.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::link::mock::MockLink;
    use std::time::Duration;

    fn fast_config() -> MotorConfig {
        MotorConfig::default()
            .with_settle_delay(Duration::from_millis(1))
            .with_poll_interval(Duration::from_millis(1))
            .with_loop_period(Duration::from_millis(5))
    }

    fn wait_for_samples(mc: &MotorController, n: usize) {
        let start = Instant::now();
        while mc.telemetry_snapshot().len() < n && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn connected(link: &MockLink) -> MotorController {
        let mc = MotorController::with_config("mock", fast_config());
        mc.connect_link(Box::new(link.clone())).unwrap();
        mc
    }

    #[test]
    fn test_manual_speed_goes_to_wire() {
        let link = MockLink::new();
        let mc = connected(&link);

        assert_eq!(mc.manual_speed_command(120).unwrap(), 120);
        assert!(matches!(mc.manual_speed_command(400), Err(MotorError::Validation(_))));
        mc.send_command(MotorCommand::SetSampling(20)).unwrap();

        mc.disconnect().unwrap();
        assert_eq!(link.written_lines(), vec!["s,120", "i,20", "s,0", "a,0"]);
    }

    #[test]
    fn test_select_mode_requires_link() {
        let mc = MotorController::with_config("mock", fast_config());
        let err = mc.select_controller_mode(ControllerVariant::P, Some(50)).unwrap_err();
        assert!(matches!(err, MotorError::Communication(PortError::NotConnected)));
        assert_eq!(mc.mode(), Mode::Manual);
    }

    #[test]
    fn test_full_control_cycle() {
        let link = MockLink::new();
        let mc = connected(&link);

        link.feed("1,1500,0.4\n");
        wait_for_samples(&mc, 1);

        assert_eq!(mc.select_controller_mode(ControllerVariant::P, Some(20)).unwrap(), Mode::Active);

        let now = Instant::now() + Duration::from_millis(50);
        let out = mc.tick_at(now).unwrap();
        assert!(matches!(out, TickOutcome::Commanded { .. }));

        assert_eq!(mc.select_controller_mode(ControllerVariant::None, None).unwrap(), Mode::Manual);
        let status = mc.status();
        assert_eq!(status.mode, Mode::Manual);
        assert!(status.connected);

        mc.disconnect().unwrap();
        let lines = link.written_lines();
        assert_eq!(lines.first().map(String::as_str), Some("s,20"));
        assert_eq!(&lines[lines.len() - 2..], &["s,0".to_string(), "a,0".to_string()]);
    }

    #[test]
    fn test_write_failure_during_tick_disconnects() {
        let link = MockLink::new();
        let mc = connected(&link);
        link.feed("1,900,0.2\n");
        wait_for_samples(&mc, 1);
        mc.select_controller_mode(ControllerVariant::PI, Some(10)).unwrap();

        link.set_fail_writes(true);
        let err = mc.tick_at(Instant::now() + Duration::from_millis(50)).unwrap_err();
        assert!(err.is_communication());
        assert_eq!(mc.mode(), Mode::Manual);
        assert!(!mc.is_connected());
    }

    #[test]
    fn test_reconnect_while_active_starts_manual() {
        let first = MockLink::new();
        let mc = connected(&first);
        first.feed("1,2000,0.3\n");
        wait_for_samples(&mc, 1);
        mc.select_controller_mode(ControllerVariant::PI, Some(20)).unwrap();

        let second = MockLink::new();
        mc.connect_link(Box::new(second.clone())).unwrap();
        assert_eq!(first.written_lines(), vec!["s,20", "s,0", "a,0"]);
        assert_eq!(mc.mode(), Mode::Manual);
        assert!(mc.status().variant.is_manual());

        //stale samples from the old link do not restart control
        let out = mc.tick_at(Instant::now() + Duration::from_millis(50)).unwrap();
        assert_eq!(out, TickOutcome::Idle);
        assert!(second.written_lines().is_empty());

        mc.disconnect().unwrap();
    }

    #[test]
    fn test_dispatch_connect_port_disables_loop() {
        let link = MockLink::new();
        let mc = connected(&link);
        link.feed("1,2000,0.3\n");
        wait_for_samples(&mc, 1);
        mc.select_controller_mode(ControllerVariant::P, Some(20)).unwrap();

        //no such port here, but the old link is closed and the loop disabled first
        let request = Request::parse("connect /dev/motor-link-missing").unwrap().unwrap();
        assert!(mc.dispatch(request).is_err());
        assert_eq!(mc.mode(), Mode::Manual);
        assert!(!mc.is_connected());
        assert_eq!(link.written_lines(), vec!["s,20", "s,0", "a,0"]);
    }

    #[test]
    fn test_on_telemetry_sample_epoch() {
        let link = MockLink::new();
        let mc = connected(&link);
        assert!(mc.on_telemetry_sample().is_none());

        link.feed("1,100,0.1\n0,200,0.2\n");
        wait_for_samples(&mc, 2);
        let (sample, epoch) = mc.on_telemetry_sample().unwrap();
        assert_eq!(sample.speed_rpm, 200.0);
        assert_eq!(epoch, 2);

        mc.disconnect().unwrap();
    }

    #[test]
    fn test_dispatch() {
        let link = MockLink::new();
        let mc = connected(&link);

        for line in ["a,1", "d,1", "s,60", "mode pi 70"] {
            let request = Request::parse(line).unwrap().unwrap();
            mc.dispatch(request).unwrap();
        }
        assert_eq!(mc.mode(), Mode::Active);

        mc.dispatch(Request::parse("r").unwrap().unwrap()).unwrap();
        assert_eq!(mc.mode(), Mode::Manual);

        mc.disconnect().unwrap();
        assert_eq!(link.written_lines(), vec!["a,1", "d,1", "s,60", "s,70", "r", "s,0", "a,0"]);
    }

    #[test]
    fn test_background_timer_ticks() {
        let link = MockLink::new();
        let mc = Arc::new(connected(&link));
        link.feed("1,1000,0.3\n");
        wait_for_samples(&mc, 1);
        mc.select_controller_mode(ControllerVariant::P, Some(10)).unwrap();

        let handle = Arc::clone(&mc).start_background();
        let start = Instant::now();
        while mc.status().last_output_cmd.is_none() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        mc.shutdown();
        handle.join().unwrap();

        assert!(mc.status().last_output_cmd.is_some());
        mc.disconnect().unwrap();
    }
}
