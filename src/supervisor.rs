// Device supervisor: connection lifecycle, telemetry polling, command
// application. Single owner of the device handle; commands from the
// presentation side are marshalled here and applied between poll passes, so
// a read and a write can never interleave mid-transaction.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{DISCOVERY_TIMEOUT, POLL_INTERVAL, RETRY_BACKOFF};
use crate::device::{AxisController, DeviceFinder, CONTROL_MODE_POSITION_CONTROL};
use crate::messages::{Command, ConnectionReport, ConnectionStatus, Event, StatusUpdate};

pub struct Supervisor {
    finder: Box<dyn DeviceFinder>,
    axis: Option<AxisController>,
    status: ConnectionStatus,
    /// Control mode currently selected on the device; decides which setpoint
    /// a target command writes
    control_mode: u32,
}

impl Supervisor {
    pub fn new(finder: Box<dyn DeviceFinder>) -> Self {
        Self {
            finder,
            axis: None,
            // Sentinel start value so the first search announces itself
            status: ConnectionStatus::Disconnected,
            control_mode: CONTROL_MODE_POSITION_CONTROL,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn connected(&self) -> bool {
        self.axis.is_some()
    }

    /// Run one cycle: a discovery attempt while searching, or one telemetry
    /// pass while connected. Returns how long to idle before the next cycle.
    pub fn tick(&mut self, events: &mut Vec<Event>) -> Duration {
        if self.axis.is_some() {
            self.poll(events)
        } else {
            self.search(events)
        }
    }

    fn search(&mut self, events: &mut Vec<Event>) -> Duration {
        self.set_status(ConnectionStatus::Searching, "searching for device", events);
        let link = match self.finder.find_any(DISCOVERY_TIMEOUT) {
            Ok(link) => link,
            Err(e) => {
                debug!("discovery failed: {e}");
                return RETRY_BACKOFF;
            }
        };

        // One-time read-back of identity and tuning; a failure here counts
        // as a connection failure and the handle is dropped on the spot
        let mut axis = AxisController::new(link);
        let report = match Self::read_back(&mut axis) {
            Ok(report) => report,
            Err(e) => {
                warn!("read-back after discovery failed: {e}");
                return RETRY_BACKOFF;
            }
        };

        info!(
            serial = %report.device.serial_hex(),
            firmware = %report.device.firmware_version(),
            "device connected"
        );
        self.control_mode = report.tuning.control_mode;
        self.axis = Some(axis);
        self.set_status(
            ConnectionStatus::Connected,
            &format!("connected to {}", report.device.serial_hex()),
            events,
        );
        events.push(Event::Connected(report));

        // Poll immediately; the first snapshot should not wait a full interval
        Duration::ZERO
    }

    fn read_back(axis: &mut AxisController) -> crate::device::Result<ConnectionReport> {
        let device = axis.device_info()?;
        let tuning = axis.read_tuning()?;
        Ok(ConnectionReport { device, tuning })
    }

    fn poll(&mut self, events: &mut Vec<Event>) -> Duration {
        let Some(axis) = self.axis.as_mut() else {
            return Duration::ZERO;
        };
        match axis.read_snapshot() {
            Ok(snapshot) => {
                events.push(Event::Telemetry(snapshot));
                POLL_INTERVAL
            }
            Err(e) => {
                warn!("telemetry read failed: {e}");
                self.invalidate("telemetry read failed", events);
                Duration::ZERO
            }
        }
    }

    /// Apply one presentation-side command. A no-op while no connection is
    /// active. Primary write failures invalidate the connection; reboot and
    /// encoder configuration discard it by design.
    pub fn dispatch(&mut self, command: Command, events: &mut Vec<Event>) {
        let Some(mut axis) = self.axis.take() else {
            debug!(?command, "no active connection, command dropped");
            return;
        };

        let mut invalidate: Option<&'static str> = None;
        match command {
            Command::SetAxisState { state } => {
                if let Err(e) = axis.set_axis_state(state) {
                    warn!("axis state write failed: {e}");
                    invalidate = Some("axis state write failed");
                }
            }
            Command::UpdateTuning { tuning } => match axis.apply_tuning(&tuning) {
                Ok(()) => self.control_mode = tuning.control_mode,
                Err(e) => {
                    warn!("tuning write failed: {e}");
                    invalidate = Some("tuning write failed");
                }
            },
            Command::SetInputTarget { value } => {
                if let Err(e) = axis.set_input_target(self.control_mode, value) {
                    warn!("setpoint write failed: {e}");
                    invalidate = Some("setpoint write failed");
                }
            }
            Command::ClearErrors => {
                if let Err(e) = axis.clear_errors() {
                    warn!("error clear failed: {e}");
                    invalidate = Some("error clear failed");
                }
            }
            Command::Reboot => {
                if let Err(e) = axis.reboot() {
                    debug!("reboot request failed: {e}");
                }
                invalidate = Some("device rebooting");
            }
            Command::ApplyEncoderConfig { cs_gpio_pin, cpr } => {
                if let Err(e) = axis.apply_encoder_config(cs_gpio_pin, cpr) {
                    warn!("encoder configuration failed: {e}");
                }
                // Configuration changes always force rediscovery
                invalidate = Some("encoder configuration applied, device restarting");
            }
        }

        match invalidate {
            None => self.axis = Some(axis),
            Some(detail) => {
                drop(axis);
                self.invalidate(detail, events);
            }
        }
    }

    /// Discard the handle and fold back to searching. Disconnection and the
    /// searching transition land in the same cycle.
    fn invalidate(&mut self, detail: &str, events: &mut Vec<Event>) {
        self.axis = None;
        self.set_status(ConnectionStatus::Disconnected, detail, events);
        self.set_status(ConnectionStatus::Searching, "rediscovering device", events);
    }

    fn set_status(&mut self, status: ConnectionStatus, detail: &str, events: &mut Vec<Event>) {
        if self.status != status {
            self.status = status;
            events.push(Event::Status(StatusUpdate {
                status,
                detail: detail.to_string(),
            }));
        }
    }
}
