use clap::{Parser, Subcommand};
use lexrag::Result;
use lexrag::commands::{run_build, run_config, run_search, run_status};
use lexrag::config::{Config, get_config_dir};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lexrag")]
#[command(about = "A retrieval engine over a fixed legal-document corpus")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the index artifacts
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection, corpus locations, and retrieval defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Scan the corpus, embed every document, and persist the index pair
    Build,
    /// Retrieve the passages most relevant to a query
    Search {
        /// Query text
        query: String,
        /// Number of passages to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Characters of each passage to display
        #[arg(long)]
        preview_len: Option<usize>,
        /// Also print the passages assembled into one context block
        #[arg(long)]
        context: bool,
    },
    /// Show Ollama connectivity and the state of the persisted index
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            run_config(&config_dir, show)?;
        }
        Commands::Build => {
            let config = Config::load(&config_dir)?;
            run_build(config)?;
        }
        Commands::Search {
            query,
            top_k,
            preview_len,
            context,
        } => {
            let config = Config::load(&config_dir)?;
            run_search(config, &query, top_k, preview_len, context)?;
        }
        Commands::Status => {
            let config = Config::load(&config_dir)?;
            run_status(&config)?;
        }
    }

    Ok(())
}
