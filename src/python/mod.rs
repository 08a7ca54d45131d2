use pyo3::prelude::*;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use std::sync::Arc;
use std::thread::JoinHandle;
use crate::control::ControllerVariant;
use crate::error::MotorError;
use crate::motor::{Mode, MotorController};
use crate::uart::{Direction, MotorCommand};

fn to_py_err(err: MotorError) -> PyErr{
    match err{
        MotorError::Communication(e) => PyIOError::new_err(e.to_string()),
        MotorError::Controller(e) => PyRuntimeError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

#[pyclass]
pub struct PyMotorController{
    inner: Arc<MotorController>,
    timer: Option<JoinHandle<()>>,
}

#[pymethods]
impl PyMotorController{
    #[new]
    fn new(port: &str) -> Self{
        PyMotorController{
            inner: Arc::new(MotorController::new(port)),
            timer: None,
        }
    }

    fn connect(&self) -> PyResult<()>{
        self.inner.connect().map_err(to_py_err)
    }

    /// Stops the control timer, then closes the link
    fn disconnect(&mut self) -> PyResult<()>{
        self.stop();
        self.inner.disconnect().map_err(to_py_err)
    }

    fn is_connected(&self) -> bool{
        self.inner.is_connected()
    }

    fn set_speed(&self, speed: i64) -> PyResult<u8>{
        self.inner.manual_speed_command(speed).map_err(to_py_err)
    }

    fn set_sampling(&self, interval_ms: u32) -> PyResult<()>{
        self.inner.send_command(MotorCommand::SetSampling(interval_ms)).map_err(to_py_err)
    }

    fn set_streaming(&self, enabled: bool) -> PyResult<()>{
        self.inner.send_command(MotorCommand::SetStreaming(enabled)).map_err(to_py_err)
    }

    fn set_direction(&self, forward: bool) -> PyResult<()>{
        let direction = if forward{ Direction::Forward } else{ Direction::Reverse };
        self.inner.send_command(MotorCommand::SetDirection(direction)).map_err(to_py_err)
    }

    fn reset(&self) -> PyResult<()>{
        self.inner.reset().map_err(to_py_err)
    }

    /// `variant` is one of "none", "p", "pi", "pid"; returns "manual" or "active"
    #[pyo3(signature = (variant, setpoint=None))]
    fn select_mode(&self, variant: &str, setpoint: Option<i64>) -> PyResult<String>{
        let variant = variant
            .parse::<ControllerVariant>()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let mode = self.inner.select_controller_mode(variant, setpoint).map_err(to_py_err)?;
        Ok(mode.to_string())
    }

    fn mode(&self) -> String{
        self.inner.mode().to_string()
    }

    fn is_active(&self) -> bool{
        self.inner.mode() == Mode::Active
    }

    /// (direction, speed_rpm, current_amps, epoch) of the newest sample
    fn latest_sample(&self) -> Option<(u8, f64, f64, u64)>{
        self.inner
            .on_telemetry_sample()
            .map(|(s, epoch)| (s.direction.as_flag(), s.speed_rpm, s.current_amps, epoch))
    }

    fn speed_history(&self) -> Vec<f64>{
        self.inner.telemetry_snapshot().iter().map(|s| s.speed_rpm).collect()
    }

    /// Start the periodic control tick
    fn start(&mut self){
        if self.timer.is_none(){
            self.timer = Some(Arc::clone(&self.inner).start_background());
        }
    }

    fn stop(&mut self){
        if let Some(handle) = self.timer.take(){
            self.inner.shutdown();
            let _ = handle.join();
        }
    }
}

#[pymodule]
fn motor_link(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyMotorController>()?;
    Ok(())
}
