// ASCII command client for the controller's CDC serial port
//
// The controller exposes a line-oriented command channel next to its native
// USB protocol: `r <path>` reads an attribute, `w <path> <value>` writes one
// (no response), and two-letter commands invoke system functions.

use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{DeviceError, DeviceFinder, DeviceFunction, DeviceLink, Result};

/// Default serial configuration for the CDC port
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// USB identity of the controller's CDC interface
pub const USB_VID: u16 = 0x1209;
pub const USB_PID: u16 = 0x0D32;

/// Wait between enumeration passes during discovery
const SCAN_INTERVAL: Duration = Duration::from_millis(250);

/// Line-oriented attribute client over one serial port
pub struct AsciiLink {
    port: Box<dyn SerialPort>,
}

impl AsciiLink {
    /// Open a port with the default CDC settings
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Cheap liveness check: reads the bus voltage
    pub fn probe(&mut self) -> Result<f32> {
        self.read_float("vbus_voltage")
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one response line, mapping a serial timeout to the attribute
    /// being waited on
    fn read_line(&mut self, path: &str) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read_exact(&mut byte) {
                Ok(()) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(DeviceError::Timeout {
                        path: path.to_string(),
                    });
                }
                Err(e) => return Err(DeviceError::Io(e)),
            }
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    fn request(&mut self, path: &str) -> Result<String> {
        self.send_line(&format!("r {path}"))?;
        self.read_line(path)
    }
}

impl DeviceLink for AsciiLink {
    fn read_float(&mut self, path: &str) -> Result<f32> {
        let raw = self.request(path)?;
        parse_float_response(path, &raw)
    }

    fn read_int(&mut self, path: &str) -> Result<i64> {
        let raw = self.request(path)?;
        parse_int_response(path, &raw)
    }

    fn write_float(&mut self, path: &str, value: f32) -> Result<()> {
        debug!("write {path} = {value}");
        self.send_line(&format!("w {path} {value}"))
    }

    fn write_int(&mut self, path: &str, value: i64) -> Result<()> {
        debug!("write {path} = {value}");
        self.send_line(&format!("w {path} {value}"))
    }

    fn call(&mut self, function: DeviceFunction) -> Result<()> {
        debug!("invoke {function:?}");
        // System commands produce no response line; a reboot in particular
        // drops the port before anything could be read back.
        self.send_line(function_token(function))
    }
}

fn function_token(function: DeviceFunction) -> &'static str {
    match function {
        DeviceFunction::ClearErrors => "sc",
        DeviceFunction::SaveConfiguration => "ss",
        DeviceFunction::Reboot => "sr",
    }
}

fn parse_float_response(path: &str, raw: &str) -> Result<f32> {
    raw.trim().parse().map_err(|_| DeviceError::Response {
        path: path.to_string(),
        raw: raw.to_string(),
    })
}

fn parse_int_response(path: &str, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| DeviceError::Response {
        path: path.to_string(),
        raw: raw.to_string(),
    })
}

/// USB discovery: enumerate serial ports, match the controller's VID/PID,
/// and probe each candidate until one answers or the deadline passes.
pub struct SerialFinder {
    port_override: Option<String>,
}

impl SerialFinder {
    /// Scan for the controller, or pin discovery to one port
    pub fn new(port_override: Option<String>) -> Self {
        Self { port_override }
    }

    fn candidate_ports(&self) -> Result<Vec<String>> {
        if let Some(port) = &self.port_override {
            return Ok(vec![port.clone()]);
        }
        let ports = serialport::available_ports()?
            .into_iter()
            .filter_map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) if usb.vid == USB_VID && usb.pid == USB_PID => {
                    Some(p.port_name)
                }
                _ => None,
            })
            .collect();
        Ok(ports)
    }
}

impl DeviceFinder for SerialFinder {
    fn find_any(&mut self, timeout: Duration) -> Result<Box<dyn DeviceLink>> {
        let deadline = Instant::now() + timeout;
        loop {
            for name in self.candidate_ports()? {
                match AsciiLink::open(&name) {
                    Ok(mut link) => match link.probe() {
                        Ok(vbus) => {
                            debug!("found device on {name} (vbus {vbus:.1} V)");
                            return Ok(Box::new(link));
                        }
                        Err(e) => debug!("{name}: probe failed: {e}"),
                    },
                    Err(e) => debug!("{name}: open failed: {e}"),
                }
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::NotFound(timeout));
            }
            thread::sleep(SCAN_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_responses() {
        assert_eq!(parse_float_response("vbus_voltage", "24.1").unwrap(), 24.1);
        assert_eq!(parse_float_response("x", " 3.25 ").unwrap(), 3.25);
        assert_eq!(parse_int_response("axis0.error", "0").unwrap(), 0);
        assert_eq!(parse_int_response("shadow", "-1482").unwrap(), -1482);
    }

    #[test]
    fn rejects_garbage_responses() {
        let err = parse_float_response("vbus_voltage", "invalid property").unwrap_err();
        match err {
            DeviceError::Response { path, raw } => {
                assert_eq!(path, "vbus_voltage");
                assert_eq!(raw, "invalid property");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn function_tokens_match_command_set() {
        assert_eq!(function_token(DeviceFunction::ClearErrors), "sc");
        assert_eq!(function_token(DeviceFunction::SaveConfiguration), "ss");
        assert_eq!(function_token(DeviceFunction::Reboot), "sr");
    }
}
