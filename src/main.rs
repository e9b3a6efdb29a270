use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use jobtrack::config::{CONFIG_FILE, TrackerToml};
use jobtrack::logging;

mod cmd;

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(version, about = "Shop-floor job and process tracker")]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "JOBTRACK_CONFIG", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Database path. Overrides jobtrack.toml and JOBTRACK_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter jobtrack.toml and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Start the HTTP and WebSocket server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a separately served UI)
        #[arg(long)]
        dev: bool,

        /// Keep all records in memory
        #[arg(long)]
        in_memory: bool,
    },
    /// List jobs, newest first
    Jobs,
    /// Show one job and its processes
    Show {
        /// Reference number or job id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = TrackerToml::load_or_default(&cli.config)?;
    settings.apply_env()?;
    if let Some(db_path) = &cli.db_path {
        settings.database.path = db_path.clone();
    }
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    logging::init_logging(&settings.logging.level, settings.logging.format)?;

    match &cli.command {
        Commands::Init { force } => cmd::cmd_init(&cli.config, &settings, *force)?,
        Commands::Serve {
            port,
            host,
            dev,
            in_memory,
        } => {
            if let Some(port) = port {
                settings.server.port = *port;
            }
            if let Some(host) = host {
                settings.server.host = host.clone();
            }
            settings.server.dev_mode |= *dev;
            settings.database.in_memory |= *in_memory;
            cmd::cmd_serve(&settings).await?;
        }
        Commands::Jobs => cmd::cmd_jobs(&settings)?,
        Commands::Show { id } => cmd::cmd_show(&settings, id)?,
    }

    Ok(())
}
