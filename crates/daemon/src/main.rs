use clap::Parser;

use scope_daemon::config::{load_config, DeviceFamily};
use scope_daemon::run;

/// Scope acquisition & timing-match daemon.
#[derive(Parser, Debug)]
#[command(name = "scope_daemon", about = "Oscilloscope acquisition and timing-match daemon")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "./config.json")]
    config: String,

    /// Force the mock device family regardless of the configuration file,
    /// matching the teacher's `--mock` development flag.
    #[arg(long)]
    mock: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = (*load_config(&cli.config)).clone();
    if cli.mock {
        config.device_family = DeviceFamily::Mock;
    }

    log::info!("scope daemon starting (device_family={:?}, mode={:?})", config.device_family, config.mode);
    run::run(&config)
}
