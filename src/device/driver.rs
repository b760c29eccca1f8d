// High-level axis operations over a device link
//
// Wraps the raw attribute access in the typed read passes and ordered write
// sequences the supervisor dispatches. Transport-agnostic: works the same
// over the serial link and the simulator.

use tracing::debug;

use super::{
    axis_attr, DeviceFunction, DeviceLink, Result, CONTROL_MODE_VELOCITY_CONTROL,
    ENCODER_MODE_SPI_ABS_AMS, INPUT_MODE_PASSTHROUGH,
};
use crate::messages::{DeviceInfo, TelemetrySnapshot, TuningParameters};

/// Typed operation layer for the single supervised axis
pub struct AxisController {
    link: Box<dyn DeviceLink>,
}

impl AxisController {
    pub fn new(link: Box<dyn DeviceLink>) -> Self {
        Self { link }
    }

    fn read_axis_float(&mut self, suffix: &str) -> Result<f32> {
        self.link.read_float(&axis_attr(suffix))
    }

    fn read_axis_int(&mut self, suffix: &str) -> Result<i64> {
        self.link.read_int(&axis_attr(suffix))
    }

    fn write_axis_float(&mut self, suffix: &str, value: f32) -> Result<()> {
        self.link.write_float(&axis_attr(suffix), value)
    }

    fn write_axis_int(&mut self, suffix: &str, value: i64) -> Result<()> {
        self.link.write_int(&axis_attr(suffix), value)
    }

    /// Read the device identity (serial number, firmware version)
    pub fn device_info(&mut self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            serial_number: self.link.read_int("serial_number")? as u64,
            fw_major: self.link.read_int("fw_version_major")? as u8,
            fw_minor: self.link.read_int("fw_version_minor")? as u8,
            fw_revision: self.link.read_int("fw_version_revision")? as u8,
        })
    }

    /// Read the controller's current tuning configuration
    pub fn read_tuning(&mut self) -> Result<TuningParameters> {
        Ok(TuningParameters {
            pos_gain: self.read_axis_float("controller.config.pos_gain")?,
            vel_gain: self.read_axis_float("controller.config.vel_gain")?,
            vel_integrator_gain: self.read_axis_float("controller.config.vel_integrator_gain")?,
            vel_limit: self.read_axis_float("controller.config.vel_limit")?,
            control_mode: self.read_axis_int("controller.config.control_mode")? as u32,
        })
    }

    /// One full telemetry pass. Fails as a whole: a single read error aborts
    /// the pass and no snapshot is produced.
    pub fn read_snapshot(&mut self) -> Result<TelemetrySnapshot> {
        Ok(TelemetrySnapshot {
            vbus_voltage: self.link.read_float("vbus_voltage")?,
            pos_estimate: self.read_axis_float("encoder.pos_estimate")?,
            vel_estimate: self.read_axis_float("encoder.vel_estimate")?,
            iq_measured: self.read_axis_float("motor.current_control.Iq_measured")?,
            shadow_count: self.read_axis_int("encoder.shadow_count")?,
            axis_error: self.read_axis_int("error")? as u32,
            encoder_error: self.read_axis_int("encoder.error")? as u32,
            axis_state: self.read_axis_int("current_state")? as u32,
            control_mode: self.read_axis_int("controller.config.control_mode")? as u32,
            input_mode: self.read_axis_int("controller.config.input_mode")? as u32,
        })
    }

    /// Request an axis state transition. No confirmation read; the next
    /// snapshot's `axis_state` is the only acknowledgement.
    pub fn set_axis_state(&mut self, state: u32) -> Result<()> {
        debug!("requesting axis state {state}");
        self.write_axis_int("requested_state", state as i64)
    }

    /// Apply new tuning. Mode goes first since gain semantics depend on the
    /// active mode; the setpoints are re-seeded last so a closed loop does
    /// not chase a stale target with the new gains.
    pub fn apply_tuning(&mut self, tuning: &TuningParameters) -> Result<()> {
        debug!(
            "applying tuning: mode={} pos_gain={} vel_gain={} vel_int={} vel_limit={}",
            tuning.control_mode,
            tuning.pos_gain,
            tuning.vel_gain,
            tuning.vel_integrator_gain,
            tuning.vel_limit
        );
        self.write_axis_int("controller.config.control_mode", tuning.control_mode as i64)?;
        self.write_axis_int(
            "controller.config.input_mode",
            INPUT_MODE_PASSTHROUGH as i64,
        )?;
        self.write_axis_float("controller.config.vel_limit", tuning.vel_limit)?;
        self.write_axis_float("controller.config.pos_gain", tuning.pos_gain)?;
        self.write_axis_float("controller.config.vel_gain", tuning.vel_gain)?;
        self.write_axis_float(
            "controller.config.vel_integrator_gain",
            tuning.vel_integrator_gain,
        )?;

        let pos = self.read_axis_float("encoder.pos_estimate")?;
        self.write_axis_float("controller.input_pos", pos)?;
        self.write_axis_float("controller.input_vel", 0.0)
    }

    /// Write the setpoint matching the selected control mode, never both
    pub fn set_input_target(&mut self, control_mode: u32, value: f32) -> Result<()> {
        if control_mode == CONTROL_MODE_VELOCITY_CONTROL {
            self.write_axis_float("controller.input_vel", value)
        } else {
            self.write_axis_float("controller.input_pos", value)
        }
    }

    /// Zero the error registers directly, then ask the device to run its own
    /// clear. The direct zeroing is the guaranteed effect; the device call is
    /// best-effort.
    pub fn clear_errors(&mut self) -> Result<()> {
        self.write_axis_int("error", 0)?;
        self.write_axis_int("encoder.error", 0)?;
        self.write_axis_int("motor.error", 0)?;
        if let Err(e) = self.link.call(DeviceFunction::ClearErrors) {
            debug!("device-level clear_errors failed: {e}");
        }
        Ok(())
    }

    /// Configure an SPI absolute encoder, persist, and restart the device.
    /// Persist and reboot are best-effort; the caller discards the
    /// connection in every case.
    pub fn apply_encoder_config(&mut self, cs_gpio_pin: u32, cpr: u32) -> Result<()> {
        self.write_axis_int("encoder.config.mode", ENCODER_MODE_SPI_ABS_AMS as i64)?;
        self.write_axis_int("encoder.config.abs_spi_cs_gpio_pin", cs_gpio_pin as i64)?;
        self.write_axis_int("encoder.config.cpr", cpr as i64)?;
        if let Err(e) = self.link.call(DeviceFunction::SaveConfiguration) {
            debug!("save_configuration failed: {e}");
        }
        if let Err(e) = self.link.call(DeviceFunction::Reboot) {
            debug!("reboot after encoder config failed: {e}");
        }
        Ok(())
    }

    /// Best-effort restart request
    pub fn reboot(&mut self) -> Result<()> {
        self.link.call(DeviceFunction::Reboot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, CONTROL_MODE_POSITION_CONTROL};
    use std::sync::{Arc, Mutex};

    /// Records every link operation in order; reads return canned values.
    struct RecordingLink {
        ops: Arc<Mutex<Vec<String>>>,
        fail_calls: bool,
    }

    impl RecordingLink {
        fn new(fail_calls: bool) -> (Self, Arc<Mutex<Vec<String>>>) {
            let ops = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    ops: ops.clone(),
                    fail_calls,
                },
                ops,
            )
        }

        fn record(&self, op: String) {
            self.ops.lock().expect("ops lock").push(op);
        }
    }

    impl DeviceLink for RecordingLink {
        fn read_float(&mut self, path: &str) -> Result<f32> {
            self.record(format!("r {path}"));
            Ok(3.25)
        }

        fn read_int(&mut self, path: &str) -> Result<i64> {
            self.record(format!("r {path}"));
            Ok(0)
        }

        fn write_float(&mut self, path: &str, value: f32) -> Result<()> {
            self.record(format!("w {path} {value}"));
            Ok(())
        }

        fn write_int(&mut self, path: &str, value: i64) -> Result<()> {
            self.record(format!("w {path} {value}"));
            Ok(())
        }

        fn call(&mut self, function: DeviceFunction) -> Result<()> {
            self.record(format!("call {function:?}"));
            if self.fail_calls {
                return Err(DeviceError::Timeout {
                    path: format!("{function:?}"),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn tuning_writes_mode_first_and_reseeds_setpoints_last() {
        let (link, ops) = RecordingLink::new(false);
        let mut axis = AxisController::new(Box::new(link));
        let tuning = TuningParameters {
            pos_gain: 20.0,
            vel_gain: 0.16,
            vel_integrator_gain: 0.32,
            vel_limit: 10.0,
            control_mode: CONTROL_MODE_POSITION_CONTROL,
        };
        axis.apply_tuning(&tuning).expect("apply tuning");

        let ops = ops.lock().expect("ops lock");
        assert_eq!(
            *ops,
            vec![
                "w axis0.controller.config.control_mode 3",
                "w axis0.controller.config.input_mode 1",
                "w axis0.controller.config.vel_limit 10",
                "w axis0.controller.config.pos_gain 20",
                "w axis0.controller.config.vel_gain 0.16",
                "w axis0.controller.config.vel_integrator_gain 0.32",
                "r axis0.encoder.pos_estimate",
                "w axis0.controller.input_pos 3.25",
                "w axis0.controller.input_vel 0",
            ]
        );
    }

    #[test]
    fn setpoint_goes_to_exactly_one_target() {
        let (link, ops) = RecordingLink::new(false);
        let mut axis = AxisController::new(Box::new(link));

        axis.set_input_target(CONTROL_MODE_POSITION_CONTROL, 1.5)
            .expect("position target");
        axis.set_input_target(CONTROL_MODE_VELOCITY_CONTROL, -2.0)
            .expect("velocity target");

        let ops = ops.lock().expect("ops lock");
        assert_eq!(
            *ops,
            vec![
                "w axis0.controller.input_pos 1.5",
                "w axis0.controller.input_vel -2",
            ]
        );
    }

    #[test]
    fn clear_errors_zeroes_registers_then_tolerates_call_failure() {
        let (link, ops) = RecordingLink::new(true);
        let mut axis = AxisController::new(Box::new(link));

        axis.clear_errors().expect("clear errors is best-effort");

        let ops = ops.lock().expect("ops lock");
        assert_eq!(
            *ops,
            vec![
                "w axis0.error 0",
                "w axis0.encoder.error 0",
                "w axis0.motor.error 0",
                "call ClearErrors",
            ]
        );
    }

    #[test]
    fn encoder_config_survives_persist_and_reboot_failure() {
        let (link, ops) = RecordingLink::new(true);
        let mut axis = AxisController::new(Box::new(link));

        axis.apply_encoder_config(4, 16384)
            .expect("persist and reboot are best-effort");

        let ops = ops.lock().expect("ops lock");
        assert_eq!(
            *ops,
            vec![
                "w axis0.encoder.config.mode 257",
                "w axis0.encoder.config.abs_spi_cs_gpio_pin 4",
                "w axis0.encoder.config.cpr 16384",
                "call SaveConfiguration",
                "call Reboot",
            ]
        );
    }
}
