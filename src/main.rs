use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracon_sweatbox::scenario::{self, ScenarioGroup};
use tracon_sweatbox::server::Server;
use tracon_sweatbox::sim::SessionManager;

#[derive(Parser)]
#[command(name = "tracon-sweatbox")]
#[command(about = "Networked TRACON radar training simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Server {
        #[arg(short, long, default_value = "6809")]
        port: u16,

        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Directory of scenario group JSON files; the built-in demo
        /// scenario is served when omitted.
        #[arg(short, long)]
        scenarios: Option<PathBuf>,

        /// Simulated minutes to run before the first client connects.
        #[arg(long)]
        prespawn: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { port, host, scenarios, prespawn } => {
            let groups = match scenarios {
                Some(dir) => scenario::load_scenario_groups(&dir)?,
                None => {
                    info!("[SCENARIO] no scenario directory given; using the built-in group");
                    let group = ScenarioGroup::builtin();
                    HashMap::from([(group.name.clone(), group)])
                }
            };

            let mut manager = SessionManager::new(groups);
            if let Some(minutes) = prespawn {
                manager = manager.with_prespawn(minutes);
            }
            let server = Server::new(Arc::new(manager), host, port);

            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("[SHUTDOWN] interrupt received, exiting");
                }
            }
        }
    }

    Ok(())
}
