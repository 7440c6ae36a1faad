//! Laundry Status Hub CLI
//!
//! Live washer/dryer occupancy from accelerometer sensors.

use clap::{Parser, Subcommand, ValueEnum};
use laundry_status_hub::{Config, ThresholdMode, WarmupPolicy, VERSION};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "laundry-hub")]
#[command(version = VERSION)]
#[command(about = "Live laundry machine occupancy from accelerometer sensors", long_about = None)]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub: accept readings and stream status changes
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Occupancy threshold (m/s², or relative deviation with --calibrate)
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of samples averaged per decision
        #[arg(long)]
        window: Option<usize>,

        /// Consecutive agreeing samples needed to flip state
        #[arg(long)]
        debounce: Option<usize>,

        /// What to report while a machine's window is filling
        #[arg(long, value_enum)]
        warmup: Option<WarmupArg>,

        /// Learn a resting baseline from this many samples per machine
        #[arg(long)]
        calibrate: Option<usize>,
    },

    /// Show the effective configuration
    Config,

    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WarmupArg {
    UntilWindowFull,
    Immediate,
}

impl From<WarmupArg> for WarmupPolicy {
    fn from(arg: WarmupArg) -> Self {
        match arg {
            WarmupArg::UntilWindowFull => WarmupPolicy::UntilWindowFull,
            WarmupArg::Immediate => WarmupPolicy::Immediate,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Serve {
            host,
            port,
            threshold,
            window,
            debounce,
            warmup,
            calibrate,
        } => {
            let mut config = load_config(&config_path);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(threshold) = threshold {
                config.classifier.threshold = threshold;
            }
            if let Some(window) = window {
                config.classifier.window_size = window;
            }
            if let Some(debounce) = debounce {
                config.classifier.debounce_samples = debounce;
            }
            if let Some(warmup) = warmup {
                config.classifier.warmup = warmup.into();
            }
            if let Some(calibration_samples) = calibrate {
                config.classifier.mode = ThresholdMode::Calibrated {
                    calibration_samples,
                };
            }
            cmd_serve(config).await;
        }
        Commands::Config => {
            cmd_config(&config_path);
        }
        Commands::InitConfig { force } => {
            cmd_init_config(&config_path, force);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn load_config(path: &Path) -> Config {
    match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config from {path:?}: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "server")]
async fn cmd_serve(config: Config) {
    use laundry_status_hub::server::{run_with_pipeline, ServerConfig};
    use laundry_status_hub::StatusPipeline;
    use std::time::Duration;

    println!("Laundry Status Hub v{VERSION}");
    println!();
    println!("  Threshold: {}", config.classifier.threshold);
    println!("  Window: {} samples", config.classifier.window_size);
    println!("  Debounce: {} samples", config.classifier.debounce_samples);
    println!("  Keep-alive: {}s", config.hub.keep_alive.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let pipeline = StatusPipeline::spawn(config.classifier.clone(), &config.hub);
    let stats = std::sync::Arc::clone(pipeline.stats());

    let (addr, shutdown_tx) =
        match run_with_pipeline(ServerConfig::from_config(&config), pipeline).await {
            Ok(running) => running,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };
    println!("Streaming status events at http://{addr}/events");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }

    let _ = shutdown_tx.send(());
    // Open event streams never finish on their own
    tokio::time::sleep(Duration::from_millis(250)).await;

    println!();
    println!("{}", stats.summary());
}

#[cfg(not(feature = "server"))]
async fn cmd_serve(_config: Config) {
    eprintln!("Error: this build does not include the HTTP server (enable the `server` feature)");
    std::process::exit(1);
}

fn cmd_config(path: &Path) {
    let config = load_config(path);

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}{}",
        path,
        if path.exists() { "" } else { " (not found, using defaults)" }
    );
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_init_config(path: &Path, force: bool) {
    if path.exists() && !force {
        eprintln!("Config file {path:?} already exists (use --force to overwrite)");
        std::process::exit(1);
    }

    if let Err(e) = Config::default().save_to(path) {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Wrote default configuration to {path:?}");
}
