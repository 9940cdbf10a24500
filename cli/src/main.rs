// lefacade: LE ACL manager facade CLI
//
// Runs the facade on a simulated controller and exposes its RPC surface over
// HTTP + WebSocket for test drivers.

mod config;
mod logging;
mod selftest;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lefacade_core::{LeAclFacade, SimulatedController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "lefacade")]
#[command(about = "LE ACL manager facade for remote test drivers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the facade and its HTTP + WebSocket server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a scripted scenario against the simulator
    Selftest,
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let log_dir = config.log_dir.as_ref().map(PathBuf::from);
    let _log_guard = logging::init(&config.log_filter, log_dir.as_deref())?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(config, port).await,
        Commands::Config { action } => cmd_config(config, action),
        Commands::Selftest => selftest::run(config.facade_config()).await,
    }
}

async fn cmd_serve(config: config::Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.listen_port);

    println!("{}", "lefacade: starting...".bold());
    println!();

    let controller = Arc::new(
        SimulatedController::new(config.sim).context("Failed to start simulated controller")?,
    );
    println!(
        "{} Simulated controller (auto_connect: {}, echo: {})",
        "✓".green(),
        config.sim.auto_connect,
        config.sim.echo
    );

    let facade = LeAclFacade::new(controller.clone(), config.facade_config());
    println!("{} Facade ready", "✓".green());
    println!();

    println!("{}", "Endpoints:".bold());
    println!("  {} /ws/connect?address=..&address_type=..", "GET ".bright_green());
    println!("  {} /ws/incoming", "GET ".bright_green());
    println!("  {} /ws/data", "GET ".bright_green());
    println!("  {} /api/disconnect", "POST".bright_green());
    println!("  {} /api/send", "POST".bright_green());
    println!("  {} /api/status", "GET ".bright_green());
    println!();
    println!("Listening on {}", format!("0.0.0.0:{}", port).bright_cyan());

    let ctx = Arc::new(server::ServerContext {
        facade,
        controller,
        start_time: Instant::now(),
    });

    tokio::select! {
        _ = server::serve(port, ctx.clone()) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            println!();
            println!("Shutting down...");
        }
    }

    ctx.facade.shutdown();
    info!("Server stopped");
    Ok(())
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown or unset config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<30} {}", key.bright_cyan(), value);
            }

            println!();
            println!(
                "File: {}",
                config::Config::config_file()?.display().to_string().dimmed()
            );
        }
    }

    Ok(())
}
