// Simulated controller for tests and the --sim run mode
//
// Holds the whole attribute tree in a shared state block so tests and demo
// harnesses can inspect writes and inject faults while the supervisor owns
// the link. Motion is a first-order response toward the active setpoint,
// advanced once per snapshot pass (keyed off the vbus read).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    DeviceError, DeviceFinder, DeviceFunction, DeviceLink, Result, AXIS_PREFIX,
    AXIS_STATE_CLOSED_LOOP_CONTROL, AXIS_STATE_IDLE, CONTROL_MODE_POSITION_CONTROL,
    CONTROL_MODE_VELOCITY_CONTROL, INPUT_MODE_PASSTHROUGH,
};

/// Seconds of simulated time per snapshot pass
const STEP_DT: f32 = 0.05;

/// Full state of the simulated device, shared with the test/demo side
#[derive(Debug)]
pub struct SimState {
    /// Whether discovery can see the device at all
    pub present: bool,

    pub serial_number: i64,
    pub fw_major: i64,
    pub fw_minor: i64,
    pub fw_revision: i64,

    pub vbus_voltage: f32,
    pub pos_estimate: f32,
    pub vel_estimate: f32,
    pub iq_measured: f32,
    pub shadow_count: i64,

    pub axis_error: i64,
    pub encoder_error: i64,
    pub motor_error: i64,

    pub current_state: i64,
    pub control_mode: i64,
    pub input_mode: i64,

    pub pos_gain: f32,
    pub vel_gain: f32,
    pub vel_integrator_gain: f32,
    pub vel_limit: f32,
    pub input_pos: f32,
    pub input_vel: f32,

    pub encoder_mode: i64,
    pub abs_spi_cs_gpio_pin: i64,
    pub cpr: i64,

    /// Functions invoked, in order
    pub calls: Vec<DeviceFunction>,

    /// Fail every read until the counter runs out
    pub fail_reads: u32,
    /// Succeed this many reads, then fail one (mid-pass fault injection)
    pub fail_after: Option<u32>,
    /// Fail every write until the counter runs out
    pub fail_writes: u32,
    /// Fail all function invocations
    pub fail_calls: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            present: true,
            serial_number: 0x2061_3375_4D4B,
            fw_major: 0,
            fw_minor: 5,
            fw_revision: 4,
            vbus_voltage: 24.0,
            pos_estimate: 0.0,
            vel_estimate: 0.0,
            iq_measured: 0.0,
            shadow_count: 0,
            axis_error: 0,
            encoder_error: 0,
            motor_error: 0,
            current_state: AXIS_STATE_IDLE as i64,
            control_mode: CONTROL_MODE_POSITION_CONTROL as i64,
            input_mode: INPUT_MODE_PASSTHROUGH as i64,
            pos_gain: 20.0,
            vel_gain: 0.16,
            vel_integrator_gain: 0.32,
            vel_limit: 20.0,
            input_pos: 0.0,
            input_vel: 0.0,
            encoder_mode: 0,
            abs_spi_cs_gpio_pin: 0,
            cpr: 8192,
            calls: Vec::new(),
            fail_reads: 0,
            fail_after: None,
            fail_writes: 0,
            fail_calls: false,
        }
    }
}

impl SimState {
    fn take_read_fault(&mut self) -> bool {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return true;
        }
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                true
            }
            Some(n) => {
                self.fail_after = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn take_write_fault(&mut self) -> bool {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return true;
        }
        false
    }

    /// Advance the motion model by one poll interval
    fn step(&mut self) {
        if self.current_state == AXIS_STATE_CLOSED_LOOP_CONTROL as i64 {
            let target_vel = if self.control_mode == CONTROL_MODE_VELOCITY_CONTROL as i64 {
                self.input_vel
            } else {
                // First-order pull toward the position setpoint
                (self.input_pos - self.pos_estimate) * 2.0
            };
            self.vel_estimate = target_vel.clamp(-self.vel_limit, self.vel_limit);
            self.pos_estimate += self.vel_estimate * STEP_DT;
            self.iq_measured = self.vel_estimate * 0.1;
        } else {
            self.vel_estimate = 0.0;
            self.iq_measured = 0.0;
        }
        self.shadow_count = (self.pos_estimate * self.cpr as f32) as i64;
    }
}

/// One live session against the simulated device
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    fn axis_suffix(path: &str) -> Option<&str> {
        path.strip_prefix(AXIS_PREFIX)
    }
}

impl DeviceLink for SimDevice {
    fn read_float(&mut self, path: &str) -> Result<f32> {
        let mut s = self.state.lock().expect("sim state lock");
        if s.take_read_fault() {
            return Err(DeviceError::Timeout {
                path: path.to_string(),
            });
        }
        if path == "vbus_voltage" {
            s.step();
            return Ok(s.vbus_voltage);
        }
        let value = match Self::axis_suffix(path) {
            Some("encoder.pos_estimate") => s.pos_estimate,
            Some("encoder.vel_estimate") => s.vel_estimate,
            Some("motor.current_control.Iq_measured") => s.iq_measured,
            Some("controller.config.pos_gain") => s.pos_gain,
            Some("controller.config.vel_gain") => s.vel_gain,
            Some("controller.config.vel_integrator_gain") => s.vel_integrator_gain,
            Some("controller.config.vel_limit") => s.vel_limit,
            Some("controller.input_pos") => s.input_pos,
            Some("controller.input_vel") => s.input_vel,
            _ => {
                return Err(DeviceError::UnknownAttribute {
                    path: path.to_string(),
                });
            }
        };
        Ok(value)
    }

    fn read_int(&mut self, path: &str) -> Result<i64> {
        let mut s = self.state.lock().expect("sim state lock");
        if s.take_read_fault() {
            return Err(DeviceError::Timeout {
                path: path.to_string(),
            });
        }
        let value = match path {
            "serial_number" => s.serial_number,
            "fw_version_major" => s.fw_major,
            "fw_version_minor" => s.fw_minor,
            "fw_version_revision" => s.fw_revision,
            _ => match Self::axis_suffix(path) {
                Some("encoder.shadow_count") => s.shadow_count,
                Some("error") => s.axis_error,
                Some("encoder.error") => s.encoder_error,
                Some("motor.error") => s.motor_error,
                Some("current_state") => s.current_state,
                Some("controller.config.control_mode") => s.control_mode,
                Some("controller.config.input_mode") => s.input_mode,
                Some("encoder.config.mode") => s.encoder_mode,
                Some("encoder.config.abs_spi_cs_gpio_pin") => s.abs_spi_cs_gpio_pin,
                Some("encoder.config.cpr") => s.cpr,
                _ => {
                    return Err(DeviceError::UnknownAttribute {
                        path: path.to_string(),
                    });
                }
            },
        };
        Ok(value)
    }

    fn write_float(&mut self, path: &str, value: f32) -> Result<()> {
        let mut s = self.state.lock().expect("sim state lock");
        if s.take_write_fault() {
            return Err(DeviceError::Timeout {
                path: path.to_string(),
            });
        }
        match Self::axis_suffix(path) {
            Some("controller.config.pos_gain") => s.pos_gain = value,
            Some("controller.config.vel_gain") => s.vel_gain = value,
            Some("controller.config.vel_integrator_gain") => s.vel_integrator_gain = value,
            Some("controller.config.vel_limit") => s.vel_limit = value,
            Some("controller.input_pos") => s.input_pos = value,
            Some("controller.input_vel") => s.input_vel = value,
            _ => {
                return Err(DeviceError::UnknownAttribute {
                    path: path.to_string(),
                });
            }
        }
        Ok(())
    }

    fn write_int(&mut self, path: &str, value: i64) -> Result<()> {
        let mut s = self.state.lock().expect("sim state lock");
        if s.take_write_fault() {
            return Err(DeviceError::Timeout {
                path: path.to_string(),
            });
        }
        match Self::axis_suffix(path) {
            // The state request is acknowledged immediately; real hardware
            // acks asynchronously through current_state
            Some("requested_state") => s.current_state = value,
            Some("error") => s.axis_error = value,
            Some("encoder.error") => s.encoder_error = value,
            Some("motor.error") => s.motor_error = value,
            Some("controller.config.control_mode") => s.control_mode = value,
            Some("controller.config.input_mode") => s.input_mode = value,
            Some("encoder.config.mode") => s.encoder_mode = value,
            Some("encoder.config.abs_spi_cs_gpio_pin") => s.abs_spi_cs_gpio_pin = value,
            Some("encoder.config.cpr") => s.cpr = value,
            _ => {
                return Err(DeviceError::UnknownAttribute {
                    path: path.to_string(),
                });
            }
        }
        Ok(())
    }

    fn call(&mut self, function: DeviceFunction) -> Result<()> {
        let mut s = self.state.lock().expect("sim state lock");
        s.calls.push(function);
        if s.fail_calls {
            return Err(DeviceError::Timeout {
                path: format!("{function:?}"),
            });
        }
        if function == DeviceFunction::ClearErrors {
            s.axis_error = 0;
            s.encoder_error = 0;
            s.motor_error = 0;
        }
        Ok(())
    }
}

/// Discovery against the simulated device
pub struct SimFinder {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFinder {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Shared handle for inspecting state and injecting faults
    pub fn handle(&self) -> Arc<Mutex<SimState>> {
        self.state.clone()
    }
}

impl DeviceFinder for SimFinder {
    fn find_any(&mut self, timeout: Duration) -> Result<Box<dyn DeviceLink>> {
        if self.state.lock().expect("sim state lock").present {
            Ok(Box::new(SimDevice {
                state: self.state.clone(),
            }))
        } else {
            Err(DeviceError::NotFound(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_loop_moves_toward_position_setpoint() {
        let mut state = SimState {
            current_state: AXIS_STATE_CLOSED_LOOP_CONTROL as i64,
            input_pos: 1.0,
            ..SimState::default()
        };
        for _ in 0..100 {
            state.step();
        }
        assert!((state.pos_estimate - 1.0).abs() < 0.05);
        assert_eq!(state.shadow_count, (state.pos_estimate * 8192.0) as i64);
    }

    #[test]
    fn idle_axis_reports_zero_velocity() {
        let mut state = SimState {
            vel_estimate: 3.0,
            ..SimState::default()
        };
        state.step();
        assert_eq!(state.vel_estimate, 0.0);
        assert_eq!(state.iq_measured, 0.0);
    }

    #[test]
    fn fail_after_counts_successful_reads() {
        let finder = SimFinder::new();
        let mut link = SimDevice {
            state: finder.handle(),
        };
        finder.handle().lock().expect("lock").fail_after = Some(2);

        assert!(link.read_float("vbus_voltage").is_ok());
        assert!(link.read_int("serial_number").is_ok());
        assert!(link.read_float("vbus_voltage").is_err());
        // Fault is one-shot
        assert!(link.read_float("vbus_voltage").is_ok());
    }
}
