// Keyboard monitor/tuner client: C=closed loop, I=idle, arrows move the
// setpoint, 0 re-centers it, E clears errors, B reboots, Q quits.
//
// Talks to the runtime purely over zenoh; run `cargo run -- --sim` first.

use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use odrive_zenoh_runtime::config::{TOPIC_CMD, TOPIC_STATUS, TOPIC_TELEMETRY};
use odrive_zenoh_runtime::device::{AXIS_STATE_CLOSED_LOOP_CONTROL, AXIS_STATE_IDLE};
use odrive_zenoh_runtime::history::History;
use odrive_zenoh_runtime::messages::{Command, StatusUpdate, TelemetrySnapshot};

/// Setpoint increment per arrow key press (turns or turns/s)
const TARGET_STEP: f32 = 0.5;

/// Velocity window used for the min/max readout
const HISTORY_LEN: usize = 200;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Controls: C=closed loop, I=idle, Up/Down=setpoint, 0=center, E=clear errors, B=reboot, Q=quit");

    enable_raw_mode()?;
    let result = run_monitor(&session).await;
    disable_raw_mode()?;
    println!();

    result
}

async fn run_monitor(
    session: &zenoh::Session,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let telemetry = session.declare_subscriber(TOPIC_TELEMETRY).await?;
    let status = session.declare_subscriber(TOPIC_STATUS).await?;
    let commands = session.declare_publisher(TOPIC_CMD).await?;

    let mut target: f32 = 0.0;
    let mut vel_window: History<f32> = History::new(HISTORY_LEN);

    loop {
        let mut pending: Option<Command> = None;

        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let TermEvent::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                match code {
                    KeyCode::Char('c') if pressed => {
                        pending = Some(Command::SetAxisState {
                            state: AXIS_STATE_CLOSED_LOOP_CONTROL,
                        });
                    }
                    KeyCode::Char('i') if pressed => {
                        pending = Some(Command::SetAxisState {
                            state: AXIS_STATE_IDLE,
                        });
                    }
                    KeyCode::Up if pressed => {
                        target += TARGET_STEP;
                        pending = Some(Command::SetInputTarget { value: target });
                    }
                    KeyCode::Down if pressed => {
                        target -= TARGET_STEP;
                        pending = Some(Command::SetInputTarget { value: target });
                    }
                    KeyCode::Char('0') if pressed => {
                        target = 0.0;
                        pending = Some(Command::SetInputTarget { value: target });
                    }
                    KeyCode::Char('e') if pressed => {
                        pending = Some(Command::ClearErrors);
                    }
                    KeyCode::Char('b') if pressed => {
                        pending = Some(Command::Reboot);
                    }
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                    _ => {}
                }
            }
        }

        if let Some(command) = pending {
            commands.put(serde_json::to_string(&command)?).await?;
        }

        // Status changes get their own line
        while let Ok(Some(sample)) = status.try_recv() {
            if let Ok(update) = serde_json::from_slice::<StatusUpdate>(&sample.payload().to_bytes())
            {
                print!("\r\n[{:?}] {}\r\n", update.status, update.detail);
            }
        }

        // Keep only the latest snapshot per screen refresh
        let mut latest: Option<TelemetrySnapshot> = None;
        while let Ok(Some(sample)) = telemetry.try_recv() {
            if let Ok(snapshot) =
                serde_json::from_slice::<TelemetrySnapshot>(&sample.payload().to_bytes())
            {
                vel_window.push(snapshot.vel_estimate);
                latest = Some(snapshot);
            }
        }

        if let Some(s) = latest {
            let (vel_min, vel_max) = window_bounds(&vel_window);
            print!(
                "\rvbus {:5.1} V | pos {:8.3} | vel {:7.3} (win {:+.2}/{:+.2}) | Iq {:6.2} A | state {} | err {:#x}/{:#x} | target {:+.2}   ",
                s.vbus_voltage,
                s.pos_estimate,
                s.vel_estimate,
                vel_min,
                vel_max,
                s.iq_measured,
                s.axis_state,
                s.axis_error,
                s.encoder_error,
                target
            );
            io::stdout().flush()?;
        }
    }

    Ok(())
}

fn window_bounds(window: &History<f32>) -> (f32, f32) {
    window
        .iter()
        .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}
