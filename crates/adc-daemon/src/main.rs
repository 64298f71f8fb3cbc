//! ADC control - Main entry point
//!
//! Serves the register/MStream HTTP API, or runs a single control command
//! against the configured devices and exits.

mod api;
mod cli;
mod config;
mod server;
mod state;

use adc_core::{Command, Verb, ALL_DEVICES};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "adc")]
#[command(about = "Register and MStream control for ADC devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "adc.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Bind address for the API server
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List configured devices
    Devices,
    /// Low level control by means of reading from/writing to registers
    Reg {
        #[command(subcommand)]
        command: RegCommands,
    },
    /// Start or stop MStream on one device, or on all devices
    Mstream {
        /// start or stop
        action: String,
        /// Device name (all devices when omitted)
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Run a raw control command: read, read-all, write, stream-start, stream-stop
    Exec {
        verb: Verb,
        /// Device name, or "all" for streaming verbs
        target: String,
        /// Register address (hex)
        addr: Option<String>,
        /// Register value (hex)
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RegCommands {
    /// Read one register
    Read {
        #[arg(short, long)]
        device: String,
        /// Register address (hex)
        #[arg(short, long)]
        addr: String,
    },
    /// Read every register in the device's register map
    ReadAll {
        #[arg(short, long)]
        device: String,
    },
    /// Write one register
    Write {
        #[arg(short, long)]
        device: String,
        /// Register address (hex)
        #[arg(short, long)]
        addr: String,
        /// Register value (hex)
        #[arg(short, long)]
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for command output
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = config::load_config(&args.config)?;

    let command = match args.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            info!("ADC control v{}", env!("CARGO_PKG_VERSION"));
            let state = state::AppState::new(&config)?;
            return server::run(state, &config.server.bind).await;
        }
        Commands::Devices => {
            for dev in &config.devices {
                let ip = dev.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string());
                println!("{}\t{:?}\t{}", dev.name, dev.transport, ip);
            }
            return Ok(());
        }
        Commands::Reg { command } => match command {
            RegCommands::Read { device, addr } => {
                Command::from_request(Verb::Read, &device, Some(addr.as_str()), None)?
            }
            RegCommands::ReadAll { device } => {
                Command::from_request(Verb::ReadAll, &device, None, None)?
            }
            RegCommands::Write {
                device,
                addr,
                value,
            } => Command::from_request(
                Verb::Write,
                &device,
                Some(addr.as_str()),
                Some(value.as_str()),
            )?,
        },
        Commands::Mstream { action, device } => {
            let verb = Verb::from_stream_action(&action)?;
            let target = device.as_deref().unwrap_or(ALL_DEVICES);
            Command::from_request(verb, target, None, None)?
        }
        Commands::Exec {
            verb,
            target,
            addr,
            value,
        } => Command::from_request(verb, &target, addr.as_deref(), value.as_deref())?,
    };

    let registry = state::build_registry(&config)?;
    cli::run(&registry, &command)
}
