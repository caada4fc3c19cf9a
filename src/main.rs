use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use staticms::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "staticms")]
#[command(
    version,
    about = "Edit GitHub-hosted Markdown and YAML content through a web form"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding `.staticms/staticms.toml` (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Log output format: human or json
    #[arg(long, global = true, default_value = "human")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to serve on (overrides staticms.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides staticms.toml)
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a local Vite dev server, bind 0.0.0.0)
        #[arg(long)]
        dev: bool,

        /// Open the UI in the default browser once the server is up
        #[arg(long)]
        open: bool,
    },
    /// View or validate the server configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Validate a content config, and optionally content files against it
    Check {
        /// Path to the content config (e.g. staticms.config.yml)
        config: PathBuf,

        /// Repository-relative content files to validate
        files: Vec<String>,

        /// Repository root the files are read from (defaults to the config's directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default staticms.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Serve {
            port,
            host,
            dev,
            open,
        } => cmd::cmd_serve(project_dir, host.clone(), *port, *dev, *open).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Check {
            config,
            files,
            root,
        } => cmd::cmd_check(config, files, root.as_deref())?,
    }

    Ok(())
}
