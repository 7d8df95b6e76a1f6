use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_chat::commands::{ask, chat, check};
use docs_chat::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docs-chat")]
#[command(about = "Chat with a local Ollama model, optionally grounded in your own documents")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.docs-chat)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat {
        /// PDF, DOCX or TXT files to index before the first question
        #[arg(long, num_args = 1..)]
        documents: Vec<PathBuf>,
    },
    /// Ask a single question and print the answer
    Ask {
        /// PDF, DOCX or TXT files to answer from
        #[arg(long, num_args = 1..)]
        documents: Vec<PathBuf>,
        /// The question to ask
        question: String,
    },
    /// Check that Ollama is reachable and both models are installed
    Check,
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chat { documents } => {
            chat(&Config::load(&config_dir)?, &documents).await?;
        }
        Commands::Ask {
            documents,
            question,
        } => {
            ask(&Config::load(&config_dir)?, &documents, &question).await?;
        }
        Commands::Check => {
            check(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}
