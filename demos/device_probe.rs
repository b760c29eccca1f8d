// Device probe: READ-ONLY check that a controller is reachable
//
// This tool does not write anything to the device - it's completely safe.
// Use it to verify cabling and identity before starting the runtime.
//
// Usage: cargo run --example device_probe -- [port]
// With no argument, USB ports are scanned for the controller's VID/PID.

use std::thread::sleep;

use odrive_zenoh_runtime::config::{DISCOVERY_TIMEOUT, POLL_INTERVAL};
use odrive_zenoh_runtime::device::{AxisController, DeviceFinder, SerialFinder};

const SNAPSHOT_COUNT: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port = std::env::args().nth(1);
    match &port {
        Some(p) => println!("Serial port: {}", p),
        None => println!("Serial port: scanning USB ports"),
    }
    println!();

    println!("Step 1: Searching for device ({:?} timeout)...", DISCOVERY_TIMEOUT);
    let link = match SerialFinder::new(port).find_any(DISCOVERY_TIMEOUT) {
        Ok(link) => {
            println!("  ✓ Device found");
            link
        }
        Err(e) => {
            println!("  ✗ Discovery failed: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the USB cable is connected");
            println!("  - Pass the port explicitly: cargo run --example device_probe -- /dev/ttyACM0");
            return Err(e.into());
        }
    };
    let mut axis = AxisController::new(link);
    println!();

    println!("Step 2: Reading device identity...");
    let info = axis.device_info()?;
    println!("  Serial number:    {}", info.serial_hex());
    println!("  Firmware version: {}", info.firmware_version());
    println!();

    println!("Step 3: Reading tuning configuration...");
    let tuning = axis.read_tuning()?;
    println!("  pos_gain:            {}", tuning.pos_gain);
    println!("  vel_gain:            {}", tuning.vel_gain);
    println!("  vel_integrator_gain: {}", tuning.vel_integrator_gain);
    println!("  vel_limit:           {}", tuning.vel_limit);
    println!("  control_mode:        {}", tuning.control_mode);
    println!();

    println!("Step 4: Sampling telemetry ({} passes)...", SNAPSHOT_COUNT);
    for i in 0..SNAPSHOT_COUNT {
        let s = axis.read_snapshot()?;
        println!(
            "  [{}] vbus={:.1}V pos={:.3} vel={:.3} Iq={:.2}A shadow={} state={} err={:#x}/{:#x}",
            i + 1,
            s.vbus_voltage,
            s.pos_estimate,
            s.vel_estimate,
            s.iq_measured,
            s.shadow_count,
            s.axis_state,
            s.axis_error,
            s.encoder_error
        );
        sleep(POLL_INTERVAL);
    }
    println!();

    println!("Probe complete. If the values above look sane, start the runtime with: cargo run");

    Ok(())
}
