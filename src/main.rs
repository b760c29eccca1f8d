use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Motor controller supervisor bridged to zenoh
#[derive(Parser)]
struct Args {
    /// Serial port of the controller (scans USB ports when omitted)
    #[arg(long)]
    port: Option<String>,

    /// Run against the built-in simulated device instead of hardware
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = odrive_zenoh_runtime::runtime::run(args.port, args.sim).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
