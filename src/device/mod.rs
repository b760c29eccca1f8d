// Device access layer for the motor controller
//
// Provides:
// - The `DeviceLink`/`DeviceFinder` capability traits the supervisor runs on
// - An ASCII command client over the controller's CDC serial port
// - A simulated controller for tests and the --sim run mode
// - `AxisController`, the typed operation layer shared by both

use std::time::Duration;

mod ascii;
mod driver;
mod sim;

pub use ascii::{AsciiLink, SerialFinder};
pub use driver::AxisController;
pub use sim::{SimFinder, SimState};

// Axis state codes (the subset this runtime names; others pass through raw)
pub const AXIS_STATE_IDLE: u32 = 1;
pub const AXIS_STATE_FULL_CALIBRATION_SEQUENCE: u32 = 3;
pub const AXIS_STATE_CLOSED_LOOP_CONTROL: u32 = 8;

// Control and input modes
pub const CONTROL_MODE_VELOCITY_CONTROL: u32 = 2;
pub const CONTROL_MODE_POSITION_CONTROL: u32 = 3;
pub const INPUT_MODE_PASSTHROUGH: u32 = 1;

// SPI absolute encoder mode (AMS parts)
pub const ENCODER_MODE_SPI_ABS_AMS: u32 = 257;

// Single-axis runtime; attribute paths are rooted under the first axis
pub(crate) const AXIS_PREFIX: &str = "axis0.";

pub(crate) fn axis_attr(suffix: &str) -> String {
    format!("{AXIS_PREFIX}{suffix}")
}

/// Error types for device communication
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no device found within {0:?}")]
    NotFound(Duration),

    #[error("timeout waiting for response to `{path}`")]
    Timeout { path: String },

    #[error("unparseable response to `{path}`: {raw:?}")]
    Response { path: String, raw: String },

    #[error("unknown attribute `{path}`")]
    UnknownAttribute { path: String },
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// System-level commands the controller exposes alongside its attribute tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFunction {
    ClearErrors,
    SaveConfiguration,
    Reboot,
}

/// Remote attribute access against a live device session.
///
/// Every method may fail; the supervisor treats any failure on a primary
/// operation as loss of the whole connection.
pub trait DeviceLink: Send {
    fn read_float(&mut self, path: &str) -> Result<f32>;
    fn read_int(&mut self, path: &str) -> Result<i64>;
    fn write_float(&mut self, path: &str, value: f32) -> Result<()>;
    fn write_int(&mut self, path: &str, value: i64) -> Result<()>;
    fn call(&mut self, function: DeviceFunction) -> Result<()>;
}

/// Discovery of a reachable device within a bounded timeout.
pub trait DeviceFinder: Send {
    fn find_any(&mut self, timeout: Duration) -> Result<Box<dyn DeviceLink>>;
}
