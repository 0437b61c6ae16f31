mod cli;
mod mistral_client;
mod relay;
#[cfg(test)]
mod test_support;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::chat::history::{default_history_path, JsonFileStore};
use crate::cli::chat::relay_client::{HttpRelayClient, DEFAULT_RELAY_URL};
use crate::cli::chat::ChatContext;
use crate::mistral_client::MistralClient;

const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay that forwards messages to Mistral
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
    /// Start a chat session against a running relay
    Chat {
        /// Single message to send instead of starting an interactive session
        #[arg(short, long)]
        input: Option<String>,

        /// Relay endpoint to send messages to
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        relay_url: String,

        /// Chat history file
        #[arg(long)]
        history: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).wrap_err("failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    // Default to chat if no subcommand is provided
    let command = cli.command.unwrap_or(Commands::Chat {
        input: None,
        relay_url: DEFAULT_RELAY_URL.to_string(),
        history: None,
        verbose: cli.verbose,
    });

    match command {
        Commands::Serve { bind, verbose } => {
            init_tracing(if verbose || cli.verbose { "debug" } else { "info" })?;
            info!("Starting Mistral relay");

            let client = MistralClient::from_env()?;
            relay::serve(bind, client).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Chat {
            input,
            relay_url,
            history,
            verbose,
        } => {
            init_tracing(if verbose || cli.verbose { "debug" } else { "warn" })?;

            let store = JsonFileStore::new(history.unwrap_or_else(default_history_path));
            info!("Using chat history at {}", store.path().display());
            let relay = HttpRelayClient::new(&relay_url)?;

            let interactive = input.is_none();
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                input,
                interactive,
                Box::new(store),
                Box::new(relay),
            );
            chat_context.run().await
        }
    }
}
