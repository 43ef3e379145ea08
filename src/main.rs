//! Binary entrypoint for the meshpipe CLI.
//!
//! Commands:
//! - `start [--port <path> | --host <addr>] [--mode <mode>]` - run the bridge
//! - `nodes [--port <path> | --host <addr>] [--json]` - print the radio's node directory
//! - `init [--mode <mode>] [--force]` - write a starter `meshpipe.toml`
//!
//! Exit status: 0 clean shutdown, 1 other failure, 2 configuration, 3 connection,
//! 4 send, 5 node directory, 6 queue file.
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use meshpipe::bridge::BridgeServer;
use meshpipe::config::Config;
use meshpipe::directory::{self, NodeDirectory};
use meshpipe::error::BridgeError;
use meshpipe::format::BridgeMode;
use meshpipe::meshtastic::{
    DeviceSnapshot, MeshTransport, RadioInterface, RadioReader, RadioSettings,
};
use meshpipe::pipes;

#[derive(Parser)]
#[command(name = "meshpipe")]
#[command(about = "FIFO pipe bridge between a local mail agent and a Meshtastic radio")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "meshpipe.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Radio to connect to; falls back to the config file when neither is given.
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct DeviceArgs {
    /// Meshtastic serial port (e.g. /dev/ttyACM0)
    #[arg(short, long)]
    port: Option<String>,

    /// Hostname or IP address of a network attached radio (host or host:port)
    #[arg(short = 'i', long)]
    host: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Start {
        #[command(flatten)]
        device: DeviceArgs,

        /// Bridge mode; without a config file this also selects the matching pipe paths
        #[arg(short, long, value_enum)]
        mode: Option<BridgeMode>,
    },
    /// Connect, print the node directory and exit
    Nodes {
        #[command(flatten)]
        device: DeviceArgs,

        /// Print JSON instead of the text listing
        #[arg(long)]
        json: bool,
    },
    /// Write a default configuration file
    Init {
        #[arg(short, long, value_enum, default_value_t = BridgeMode::Addressed)]
        mode: BridgeMode,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        let code = e
            .downcast_ref::<BridgeError>()
            .map(BridgeError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { mode, force } => {
            init_logging(None, cli.verbose);
            Config::create_default(&cli.config, mode, force).await?;
            info!("Wrote {} configuration to {}", mode, cli.config);
            println!("Created {} ({} mode)", cli.config, mode);
            Ok(())
        }
        Commands::Start { device, mode } => {
            let config = load_config(&cli.config, mode, cli.verbose).await?;
            info!("Starting meshpipe v{}", env!("CARGO_PKG_VERSION"));
            run_bridge(config, device).await
        }
        Commands::Nodes { device, json } => {
            let config = load_config(&cli.config, None, cli.verbose).await?;
            show_nodes(config, device, json).await
        }
    }
}

/// Load the config file (defaults when absent), apply a CLI mode and set up logging.
async fn load_config(path: &str, mode: Option<BridgeMode>, verbosity: u8) -> Result<Config> {
    let exists = Path::new(path).exists();
    let loaded = Config::load_or_default(path).await;
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            init_logging(None, verbosity);
            return Err(e.into());
        }
    };
    if let Some(mode) = mode {
        if exists {
            config.bridge.mode = mode;
        } else {
            config = Config::preset(mode);
        }
    }
    init_logging(Some(&config), verbosity);
    if !exists {
        info!("No configuration at {}, using {} defaults", path, config.bridge.mode);
    }
    Ok(config)
}

async fn connect(
    config: &Config,
    device: &DeviceArgs,
) -> Result<(RadioInterface, DeviceSnapshot, RadioReader)> {
    let target = config.resolve_target(device.port.as_deref(), device.host.as_deref())?;
    let connected = RadioInterface::connect(target, RadioSettings::from(&config.meshtastic))
        .await?;
    Ok(connected)
}

async fn run_bridge(config: Config, device: DeviceArgs) -> Result<()> {
    pipes::ensure_fifo(&config.pipes.inbound, config.pipes.create_missing).await?;
    pipes::ensure_fifo(&config.pipes.outbound, config.pipes.create_missing).await?;

    let (radio, snapshot, reader) = connect(&config, &device).await?;
    let mut bridge = BridgeServer::new(config.clone(), radio);
    let outcome = drive(&mut bridge, &config, &snapshot, reader).await;
    bridge.shutdown();
    outcome
}

async fn drive(
    bridge: &mut BridgeServer<RadioInterface>,
    config: &Config,
    snapshot: &DeviceSnapshot,
    reader: RadioReader,
) -> Result<()> {
    bridge.refresh_directory(&snapshot.station_record(), &snapshot.node_table())?;
    bridge.publish_station_address().await?;

    let (radio_tx, radio_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || reader.run(radio_tx));

    bridge.announce()?;

    let (lines_rx, inbound_task) = pipes::spawn_inbound_reader(config.pipes.inbound.clone());
    let (mail_tx, writer_task) = pipes::spawn_queue_writer(config.pipes.outbound.clone());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = bridge.run(lines_rx, radio_rx, mail_tx, shutdown).await;

    inbound_task.abort();
    writer_task.abort();
    result.context("bridge stopped")
}

async fn show_nodes(config: Config, device: DeviceArgs, json: bool) -> Result<()> {
    let (mut radio, snapshot, _reader) = connect(&config, &device).await?;
    let station = snapshot.station_record();
    let nodes = snapshot.node_table();
    let built = if config.bridge.strict_directory {
        directory::refresh(&station, &nodes)
    } else {
        directory::refresh_lenient(&station, &nodes).map(|(dir, _)| dir)
    };
    radio.disconnect();
    let dir = built.map_err(|source| BridgeError::Directory {
        context: meshpipe::bridge::DIRECTORY_CONTEXT,
        source,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dir)?);
    } else {
        print_directory(&dir);
    }
    Ok(())
}

fn print_directory(dir: &NodeDirectory) {
    let s = &dir.station;
    println!("Station:   {} ({})", s.long_name, s.node_id);
    println!("Address:   {}", s.address_token());
    println!("HW model:  {}", s.hw_model);
    println!("MAC:       {}", s.mac);
    if let Some(pos) = s.position {
        println!("Position:  {} {}", pos.latitude, pos.longitude);
    }
    if let Some(b) = s.battery_level {
        println!("Battery:   {}", b);
    }
    println!("-----");
    for peer in dir.peers.values() {
        println!("NAME:      {}", peer.long_name);
        println!("NODE:      {}", peer.node_num);
        println!("ID:        {}", peer.node_id);
        println!("MAC:       {}", peer.mac);
        if let (Some(pos), Some(tile)) = (peer.position, peer.tile) {
            println!("Tile:      {}/{}", tile.x, tile.y);
            println!("LAT:       {}", pos.latitude);
            println!("LONG:      {}", pos.longitude);
        }
        if let Some(b) = peer.battery_level {
            println!("Battery:   {}", b);
        }
        if let Some(heard) = peer.last_heard_display() {
            println!("LastHeard: {}", heard);
        }
        println!("-----");
    }
}

fn init_logging(config: Option<&Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // -v / -vv win over the configured level
    let level = match verbosity {
        0 => config
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match log_file {
        Some(f) => {
            let file = std::sync::Mutex::new(f);
            // console echo only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
