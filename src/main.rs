//! CryptoCam Agent CLI
//!
//! Records in fixed segments and only uploads the ones whose key a nearby
//! peer actually read.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cryptocam_agent::{
    capture::{self, CaptureDevice, NoopCapture},
    channel::{Advertisement, LoopbackChannel, PeerEvents, PeripheralBridge, SharedChannel},
    config::Config,
    core::{sweep, Pipeline, RotationController, RotationSettings},
    crypto, erase,
    keys::KeyMaterial,
    media::Mp4BoxFfmpeg,
    storage,
    transparency::{create_shared_log_with_persistence, read_persisted},
    AgentError, PRIVACY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cryptocam")]
#[command(version = VERSION)]
#[command(about = "Privacy-first recording camera with per-segment keys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start recording and disclosing keys
    Start {
        /// Directory for recordings and processing artifacts
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Segment length in seconds
        #[arg(long)]
        segment_secs: Option<u64>,

        /// Unix socket served for the peripheral daemon
        #[arg(long)]
        peripheral_socket: Option<PathBuf>,

        /// Run without a camera (every segment is empty)
        #[arg(long)]
        no_capture: bool,
    },

    /// Decrypt a downloaded artifact with a disclosed key
    Decrypt {
        #[arg(long, short)]
        input: PathBuf,

        #[arg(long, short)]
        output: PathBuf,

        /// Hex-encoded 32-byte key
        #[arg(long)]
        key: String,

        /// Hex-encoded 16-byte IV
        #[arg(long)]
        iv: String,
    },

    /// Erase leftover recordings from a previous run
    Sweep {
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Show cumulative statistics
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            work_dir,
            segment_secs,
            peripheral_socket,
            no_capture,
        } => cmd_start(work_dir, segment_secs, peripheral_socket, no_capture)
            .await
            .map_err(anyhow::Error::from),
        Commands::Decrypt {
            input,
            output,
            key,
            iv,
        } => cmd_decrypt(input, output, &key, &iv),
        Commands::Sweep { work_dir } => cmd_sweep(work_dir).await,
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Privacy => {
            cmd_privacy();
            Ok(())
        }
        Commands::Config { save } => cmd_config(save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cryptocam_agent=info,cryptocam=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_start(
    work_dir: Option<PathBuf>,
    segment_secs: Option<u64>,
    peripheral_socket: Option<PathBuf>,
    no_capture: bool,
) -> Result<(), AgentError> {
    println!("CryptoCam Agent v{VERSION}");
    println!();

    let mut config = Config::load()?;
    if let Some(dir) = work_dir {
        config.work_dir = dir;
    }
    if let Some(secs) = segment_secs {
        config.segment_duration = Duration::from_secs(secs);
    }
    if peripheral_socket.is_some() {
        config.peripheral_socket = peripheral_socket;
    }
    config.validate()?;
    config.ensure_directories()?;

    println!("  Segment duration: {}s", config.segment_duration.as_secs());
    println!("  Work directory: {:?}", config.work_dir);
    println!("  Upload prefix: {}", config.store.base_url);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let eraser = erase::from_mode(config.erase);
    sweep(&config.work_dir, eraser.as_ref()).await?;

    let store = storage::from_config(&config.store)?;
    let tools = Arc::new(Mp4BoxFfmpeg::new(config.tools.clone(), config.capture.fps));
    let transparency = create_shared_log_with_persistence(config.transparency_path());
    let pipeline = Arc::new(Pipeline::new(
        tools,
        store,
        eraser,
        transparency.clone(),
        config.handoff_delay,
    ));

    // Keeps the bridge listener alive until the agent returns.
    let (channel, events, _bridge): (SharedChannel, PeerEvents, Option<oneshot::Sender<()>>) =
        match &config.peripheral_socket {
            Some(path) => {
                let advertisement = Advertisement {
                    name: config.device_name.clone(),
                    service: config.service_uuid.clone(),
                    characteristic: config.key_characteristic_uuid.clone(),
                };
                let (bridge, events, stop) = PeripheralBridge::bind(path, advertisement).await?;
                info!(socket = %path.display(), "Waiting for peripheral daemon");
                (bridge as SharedChannel, events, Some(stop))
            }
            None => {
                warn!(
                    "No peripheral socket configured, keys cannot be read and every segment \
                     will be discarded"
                );
                let (loopback, events) = LoopbackChannel::new();
                (loopback as SharedChannel, events, None)
            }
        };

    let capture: Box<dyn CaptureDevice> = if no_capture {
        Box::new(NoopCapture::new())
    } else {
        capture::from_config(&config.capture)
    };

    let settings = RotationSettings {
        segment_duration: config.segment_duration,
        bonding_timeout: config.bonding_timeout,
        read_timeout: config.read_timeout,
        work_dir: config.work_dir.clone(),
        base_url: config.store.base_url.clone(),
    };
    let controller = RotationController::new(
        settings,
        capture,
        channel,
        pipeline,
        transparency.clone(),
    );

    let (stop, shutdown) = watch::channel(false);
    ctrlc_handler(stop)?;

    let result = controller.run(events, shutdown).await;

    println!();
    println!("Stopping...");
    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
    println!();
    println!("{}", transparency.summary());

    if let Err(e) = &result {
        if e.is_fatal() {
            eprintln!("Refusing to continue without a working entropy source.");
        }
    }
    result
}

fn cmd_decrypt(input: PathBuf, output: PathBuf, key: &str, iv: &str) -> anyhow::Result<()> {
    let material = KeyMaterial::from_hex(key, iv).context("Invalid key or IV")?;
    let bytes = crypto::decrypt_file(&material, &input, &output)?;
    println!("Decrypted {bytes} bytes to {output:?}");
    Ok(())
}

async fn cmd_sweep(work_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let dir = work_dir.unwrap_or(config.work_dir);
    let eraser = erase::from_mode(config.erase);
    let erased = sweep(&dir, eraser.as_ref()).await?;
    println!("Erased {erased} leftover files from {dir:?}");
    Ok(())
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("CryptoCam Agent Status");
    println!("======================");
    println!();

    println!("Configuration:");
    println!("  Segment duration: {}s", config.segment_duration.as_secs());
    println!("  Bonding timeout: {}s", config.bonding_timeout.as_secs());
    println!("  Post-read timeout: {}s", config.read_timeout.as_secs());
    println!("  Work directory: {:?}", config.work_dir);
    println!(
        "  Peripheral socket: {}",
        config
            .peripheral_socket
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not configured".to_string())
    );
    println!();

    match read_persisted(&config.transparency_path()) {
        Ok(stats) => {
            println!("Cumulative Statistics:");
            println!("  Segments recorded: {}", stats.segments_recorded);
            println!("  Keys read: {}", stats.keys_read);
            println!("  Segments discarded unread: {}", stats.segments_discarded);
            println!("  Jobs fully uploaded: {}", stats.jobs_completed);
            println!("  Jobs with lost artifacts: {}", stats.jobs_failed);
            println!(
                "  Encrypted artifacts uploaded: {}",
                stats.artifacts_uploaded
            );
            println!("  Failed uploads: {}", stats.uploads_failed);
            println!("  Last updated: {}", stats.last_updated);
        }
        Err(_) => println!("No previous session data found."),
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    if save {
        config.save().context("Could not save configuration")?;
        println!("Saved configuration to {:?}", Config::config_path());
        return Ok(());
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(shutdown: watch::Sender<bool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let _ = shutdown.send(true);
    })
}
