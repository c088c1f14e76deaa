//! mindctrl command line client
//!
//! Talks to a mindctrl browser extension through the MQTT broker both sides
//! are connected to.

use clap::{Parser, Subcommand};
use std::process;

mod commands;

/// Mind control your browser for fun and profit
#[derive(Debug, Parser)]
#[command(name = "mindctrl", version, about)]
pub struct Cli {
    /// URL of the intermediate MQTT broker, `ws://host[:port]/path` or `mqtt://host[:port]`
    #[arg(short = 's', long, env = "MINDCTRL_SERVER")]
    server: String,

    /// Name of the browser to control
    #[arg(short = 'b', long, env = "MINDCTRL_BROWSER")]
    browser: String,

    /// Username for the broker
    #[arg(short = 'u', long, env = "MINDCTRL_USERNAME", requires = "password")]
    username: Option<String>,

    /// Password for the broker
    #[arg(
        short = 'p',
        long,
        env = "MINDCTRL_PASSWORD",
        requires = "username",
        hide_env_values = true
    )]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the browser answers
    Ping,

    /// Print information about the browser
    Info {
        #[command(subcommand)]
        target: InfoTarget,
    },

    /// Call a remote method and print its raw output
    Call {
        /// Method name, e.g. "tabs.find"
        method: String,
        /// Method input as JSON
        #[arg(default_value = "{}", value_parser = parse_json)]
        params: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum InfoTarget {
    /// Print information about the browser
    Browser,
    /// Print information about the platform
    Platform,
    /// Print information about everything
    All,
}

fn parse_json(text: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON: {}", e))
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit with 2 from here
    let cli = Cli::parse();

    if let Err(e) = commands::run(cli).await {
        eprintln!("ERROR: Program cannot continue due to execution error. Traceback:\n");
        for cause in e.chain() {
            eprintln!("- {}", cause);
        }
        eprintln!();
        process::exit(3);
    }
}
