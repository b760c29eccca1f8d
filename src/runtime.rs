// Bridge loop: zenoh on one side, the device supervisor on the other
//
// Presentation clients never touch the device. They publish commands on the
// command topic and consume snapshots/status from the telemetry topics; the
// loop below is the only context that drives the connection handle.

use tracing::{info, warn};

use crate::config::{
    DISCOVERY_TIMEOUT, POLL_INTERVAL, TOPIC_CMD, TOPIC_CONFIG, TOPIC_STATUS, TOPIC_TELEMETRY,
};
use crate::device::{DeviceFinder, SerialFinder, SimFinder};
use crate::messages::{Command, Event};
use crate::supervisor::Supervisor;

pub async fn run(
    port: Option<String>,
    sim: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;
    let pub_config = session.declare_publisher(TOPIC_CONFIG).await?;

    let finder: Box<dyn DeviceFinder> = if sim {
        info!("Using simulated device");
        Box::new(SimFinder::new())
    } else {
        Box::new(SerialFinder::new(port))
    };
    let mut supervisor = Supervisor::new(finder);
    let mut events: Vec<Event> = Vec::new();

    info!(
        "Runtime started: {}ms poll interval, {}s discovery timeout",
        POLL_INTERVAL.as_millis(),
        DISCOVERY_TIMEOUT.as_secs()
    );
    info!("Subscribed to: {}", TOPIC_CMD);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_TELEMETRY, TOPIC_STATUS, TOPIC_CONFIG
    );

    loop {
        // 1. Drain all pending commands (non-blocking) and apply them
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<Command>(&payload) {
                Ok(command) => {
                    supervisor.dispatch(command, &mut events);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. One supervisor cycle: discovery attempt or telemetry pass
        let idle = supervisor.tick(&mut events);

        // 3. Publish whatever the cycle produced
        for event in events.drain(..) {
            match event {
                Event::Telemetry(snapshot) => {
                    pub_telemetry.put(serde_json::to_string(&snapshot)?).await?;
                }
                Event::Status(update) => {
                    pub_status.put(serde_json::to_string(&update)?).await?;
                }
                Event::Connected(report) => {
                    pub_config.put(serde_json::to_string(&report)?).await?;
                }
            }
        }

        // 4. Idle per the supervisor's hint (poll cadence or search backoff)
        tokio::time::sleep(idle).await;
    }
}
