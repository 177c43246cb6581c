//! LuffyBlocker CLI
//!
//! Drives the extension core outside the browser: replays host event
//! scripts, stress-tests the counter protocol and validates configs.

use std::fs;

use clap::{Parser, Subcommand};

use lb_core::config::BlockerConfig;

mod simulate;
mod stress;

use simulate::SimulateOptions;
use stress::StressOptions;

#[derive(Parser)]
#[command(name = "lb-cli")]
#[command(about = "LuffyBlocker simulation and diagnostics")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script of host events through the background
    Simulate {
        /// Script file (JSON array of events)
        #[arg(short, long)]
        script: String,

        /// Config file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Send concurrent scan results and verify no update is lost
    Stress {
        /// Number of tabs
        #[arg(long, default_value_t = 4)]
        tabs: u32,

        /// Concurrent senders per tab
        #[arg(long, default_value_t = 8)]
        senders: u32,

        /// Messages per sender and tab
        #[arg(long, default_value_t = 100)]
        messages: u64,
    },

    /// Validate a config file
    CheckConfig {
        /// Config file to validate
        #[arg(short, long)]
        input: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let result = match cli.command {
        Commands::Simulate { script, config } => simulate::run_simulate(SimulateOptions { script, config }),
        Commands::Stress {
            tabs,
            senders,
            messages,
        } => stress::run_stress(StressOptions {
            tabs,
            senders,
            messages,
        }),
        Commands::CheckConfig { input } => cmd_check_config(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

pub(crate) fn load_config(path: &str) -> Result<BlockerConfig, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    BlockerConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
}

fn cmd_check_config(input: &str) -> Result<(), String> {
    let config = load_config(input)?;
    let kinds = config.media_kinds().map_err(|e| e.to_string())?;

    println!("Config '{}' is valid", input);
    println!("  Interval:    {}ms", config.scan_interval_ms);
    println!("  Namespace:   {}", config.namespace);
    println!("  Kinds:       {}", kinds.selector());
    println!("  Images:      {}", config.assets.images.len());
    println!("  Video:       {}", config.assets.video);
    println!("  Embed:       {}", config.assets.embed);

    Ok(())
}
