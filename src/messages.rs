// Message types exchanged with presentation clients

use serde::{Deserialize, Serialize};

/// One consistent read pass over the controller's telemetry attributes.
///
/// Values are forwarded exactly as the device reports them; state and mode
/// fields stay raw integers so firmware states this runtime does not name
/// (calibration sequences and the like) still pass through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub vbus_voltage: f32,
    /// Position estimate in turns
    pub pos_estimate: f32,
    /// Velocity estimate in turns/s
    pub vel_estimate: f32,
    /// Measured quadrature current in amps
    pub iq_measured: f32,
    /// Raw incremental encoder count
    pub shadow_count: i64,
    /// Axis error bitmask
    pub axis_error: u32,
    /// Encoder error bitmask
    pub encoder_error: u32,
    pub axis_state: u32,
    pub control_mode: u32,
    pub input_mode: u32,
}

/// User-editable control loop coefficients plus the mode they apply to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningParameters {
    pub pos_gain: f32,
    pub vel_gain: f32,
    pub vel_integrator_gain: f32,
    /// Velocity limit in turns/s
    pub vel_limit: f32,
    pub control_mode: u32,
}

/// Device identity read once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: u64,
    pub fw_major: u8,
    pub fw_minor: u8,
    pub fw_revision: u8,
}

impl DeviceInfo {
    /// Serial number in the uppercase hex form the vendor tools print
    pub fn serial_hex(&self) -> String {
        format!("{:X}", self.serial_number)
    }

    pub fn firmware_version(&self) -> String {
        format!("{}.{}.{}", self.fw_major, self.fw_minor, self.fw_revision)
    }
}

/// Connection lifecycle as seen by presentation clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Searching,
    Connected,
    Disconnected,
}

/// Status change with a human-readable detail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    pub detail: String,
}

/// Published exactly once per connection, before any telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub device: DeviceInfo,
    pub tuning: TuningParameters,
}

/// Commands from presentation clients -> runtime.
///
/// All of these are fire-and-forget: the runtime never reads a written value
/// back to confirm it took effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Request an axis state transition (idle, closed loop, calibration, ...)
    SetAxisState { state: u32 },
    /// Apply new control loop tuning
    UpdateTuning {
        #[serde(flatten)]
        tuning: TuningParameters,
    },
    /// Move the setpoint of whichever control mode is active
    SetInputTarget { value: f32 },
    /// Zero the error registers, then ask the device to clear its own
    ClearErrors,
    /// Best-effort device restart; always forces rediscovery
    Reboot,
    /// Write SPI encoder wiring and resolution, persist, reboot
    ApplyEncoderConfig { cs_gpio_pin: u32, cpr: u32 },
}

/// Events produced by the supervisor for the presentation side.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Telemetry(TelemetrySnapshot),
    Status(StatusUpdate),
    Connected(ConnectionReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_json_is_tagged_snake_case() {
        let cmd: Command = serde_json::from_str(r#"{"type":"set_axis_state","state":8}"#)
            .expect("parse set_axis_state");
        assert_eq!(cmd, Command::SetAxisState { state: 8 });

        let cmd: Command = serde_json::from_str(r#"{"type":"clear_errors"}"#)
            .expect("parse clear_errors");
        assert_eq!(cmd, Command::ClearErrors);
    }

    #[test]
    fn update_tuning_fields_are_flattened() {
        let raw = r#"{
            "type": "update_tuning",
            "pos_gain": 20.0,
            "vel_gain": 0.16,
            "vel_integrator_gain": 0.32,
            "vel_limit": 10.0,
            "control_mode": 3
        }"#;
        let cmd: Command = serde_json::from_str(raw).expect("parse update_tuning");
        let Command::UpdateTuning { tuning } = cmd else {
            panic!("wrong variant: {cmd:?}");
        };
        assert_eq!(tuning.pos_gain, 20.0);
        assert_eq!(tuning.control_mode, 3);
    }

    #[test]
    fn status_serializes_snake_case() {
        let update = StatusUpdate {
            status: ConnectionStatus::Searching,
            detail: "searching for device".into(),
        };
        let json = serde_json::to_string(&update).expect("serialize status");
        assert!(json.contains(r#""status":"searching""#));
    }

    #[test]
    fn device_info_formats_like_vendor_tools() {
        let info = DeviceInfo {
            serial_number: 0x2061_3375_4D4B,
            fw_major: 0,
            fw_minor: 5,
            fw_revision: 4,
        };
        assert_eq!(info.serial_hex(), "206133754D4B");
        assert_eq!(info.firmware_version(), "0.5.4");
    }
}
