use std::ffi::{c_char, CStr};
use std::ptr;

use libc::c_int;

use crate::control::ControllerVariant;
use crate::error::{MotorError, PortError};
use crate::motor::{Mode, MotorController};
use crate::uart::{Direction, MotorCommand};

pub const MOTOR_OK: c_int = 0;
pub const MOTOR_ERR_NULL: c_int = -1;
pub const MOTOR_ERR_VALIDATION: c_int = -2;
pub const MOTOR_ERR_MODE: c_int = -3;
pub const MOTOR_ERR_CONTROLLER: c_int = -4;
pub const MOTOR_ERR_NOT_CONNECTED: c_int = -5;
pub const MOTOR_ERR_COMMUNICATION: c_int = -6;

pub struct MotorHandle{
    inner: MotorController,
}

/// Latest telemetry for C callers
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct MotorSample{
    pub direction: c_int, //1 forward, 0 reverse
    pub speed_rpm: f64,
    pub current_amps: f64,
    pub epoch: u64,
}

fn error_code(err: &MotorError) -> c_int{
    match err{
        MotorError::Validation(_) => MOTOR_ERR_VALIDATION,
        MotorError::ModeTransition(_) => MOTOR_ERR_MODE,
        MotorError::Controller(_) => MOTOR_ERR_CONTROLLER,
        MotorError::Communication(PortError::NotConnected) => MOTOR_ERR_NOT_CONNECTED,
        MotorError::Communication(_) => MOTOR_ERR_COMMUNICATION,
    }
}

fn status_code<T>(result: Result<T, MotorError>) -> c_int{
    match result{
        Ok(_) => MOTOR_OK,
        Err(e) => error_code(&e),
    }
}

fn variant_from_code(code: c_int) -> Option<ControllerVariant>{
    match code{
        0 => Some(ControllerVariant::None),
        1 => Some(ControllerVariant::P),
        2 => Some(ControllerVariant::PI),
        3 => Some(ControllerVariant::PID),
        _ => None,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_new(port: *const c_char) -> *mut MotorHandle{
    if port.is_null(){
        return ptr::null_mut();
    }

    let port_str = match unsafe{ CStr::from_ptr(port) }.to_str(){
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    Box::into_raw(Box::new(MotorHandle{ inner: MotorController::new(port_str) }))
}

/// Disconnects first if still connected
#[no_mangle]
pub unsafe extern "C" fn motor_free(handle: *mut MotorHandle){
    if !handle.is_null(){
        unsafe{ drop(Box::from_raw(handle)); }
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_connect(handle: *mut MotorHandle) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.connect()),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_disconnect(handle: *mut MotorHandle) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.disconnect()),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_is_connected(handle: *mut MotorHandle) -> bool{
    match unsafe{ handle.as_ref() }{
        Some(h) => h.inner.is_connected(),
        None => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_set_speed(handle: *mut MotorHandle, speed: i64) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.manual_speed_command(speed)),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_set_sampling(handle: *mut MotorHandle, interval_ms: u32) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.send_command(MotorCommand::SetSampling(interval_ms))),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_set_streaming(handle: *mut MotorHandle, enabled: bool) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.send_command(MotorCommand::SetStreaming(enabled))),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_set_direction(handle: *mut MotorHandle, forward: bool) -> c_int{
    let direction = if forward{ Direction::Forward } else{ Direction::Reverse };
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.send_command(MotorCommand::SetDirection(direction))),
        None => MOTOR_ERR_NULL,
    }
}

#[no_mangle]
pub unsafe extern "C" fn motor_reset(handle: *mut MotorHandle) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.reset()),
        None => MOTOR_ERR_NULL,
    }
}

/// variant: 0 none, 1 P, 2 PI, 3 PID. A negative setpoint means "not given".
#[no_mangle]
pub unsafe extern "C" fn motor_select_mode(handle: *mut MotorHandle, variant: c_int, setpoint: i64) -> c_int{
    let h = match unsafe{ handle.as_ref() }{
        Some(h) => h,
        None => return MOTOR_ERR_NULL,
    };
    let variant = match variant_from_code(variant){
        Some(v) => v,
        None => return MOTOR_ERR_VALIDATION,
    };
    let explicit = if setpoint < 0{ None } else{ Some(setpoint) };
    status_code(h.inner.select_controller_mode(variant, explicit))
}

/// 1 active, 0 manual, -1 null handle
#[no_mangle]
pub unsafe extern "C" fn motor_mode(handle: *mut MotorHandle) -> c_int{
    match unsafe{ handle.as_ref() }.map(|h| h.inner.mode()){
        Some(Mode::Active) => 1,
        Some(Mode::Manual) => 0,
        None => MOTOR_ERR_NULL,
    }
}

/// Runs one control step now
#[no_mangle]
pub unsafe extern "C" fn motor_tick(handle: *mut MotorHandle) -> c_int{
    match unsafe{ handle.as_ref() }{
        Some(h) => status_code(h.inner.tick()),
        None => MOTOR_ERR_NULL,
    }
}

/// 1 and fills `out` when a sample exists, 0 when none yet
#[no_mangle]
pub unsafe extern "C" fn motor_latest_sample(handle: *mut MotorHandle, out: *mut MotorSample) -> c_int{
    if handle.is_null() || out.is_null(){
        return MOTOR_ERR_NULL;
    }

    unsafe{
        let h = &*handle;
        match h.inner.on_telemetry_sample(){
            Some((sample, epoch)) =>{
                *out = MotorSample{
                    direction: sample.direction.as_flag() as c_int,
                    speed_rpm: sample.speed_rpm,
                    current_amps: sample.current_amps,
                    epoch,
                };
                1
            }
            None => 0,
        }
    }
}
