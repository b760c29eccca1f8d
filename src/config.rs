// Timeouts, topics, poll cadence
use std::time::Duration;

// Telemetry poll cadence while a device is connected (~20 Hz)
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

// Upper bound on a single discovery attempt
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

// Wait between failed discovery attempts; retries never stop
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

// Zenoh topics
pub const TOPIC_CMD: &str = "odrive/cmd"; // commands from presentation clients
pub const TOPIC_TELEMETRY: &str = "odrive/rt/telemetry"; // snapshots
pub const TOPIC_STATUS: &str = "odrive/state/status"; // connection status
pub const TOPIC_CONFIG: &str = "odrive/state/config"; // per-connection report
