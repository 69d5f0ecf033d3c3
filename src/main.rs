use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cairn::{cli, config, server};

#[derive(Parser)]
#[command(name = "cairn", version, about = "Hybrid search over your markdown notes, served over MCP")]
struct Cli {
    /// Config file (defaults to ~/.cairn/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio unless --http or server.transport = "http")
    Serve {
        /// Serve Streamable HTTP on server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Create the workspace and its bootstrap files
    Init,
    /// Search the notes
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Minimum combined score
        #[arg(long)]
        min_score: Option<f64>,
    },
    /// Bring the index up to date with the workspace
    Reindex {
        /// Clear the index and re-embed every document
        #[arg(long)]
        full: bool,
    },
    /// Show index status
    Status,
    /// Check the database and the embedding backend
    Doctor,
    /// Index, then keep the index in sync with the workspace until ctrl-c
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::CairnConfig::load_from(path)?,
        None => config::CairnConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Init => cli::init::init(&config)?,
        Command::Search {
            query,
            limit,
            min_score,
        } => cli::search::search(config, &query, limit, min_score).await?,
        Command::Reindex { full } => cli::reindex::reindex(config, full).await?,
        Command::Status => cli::status::status(config)?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Watch => cli::watch::watch(config).await?,
    }

    Ok(())
}
