use std::sync::Arc;

use clap::{Parser, Subcommand};
use stride_runtime::EngineConfig;

mod commands;
mod http;
mod util;

use commands::search::SearchKind;
use http::HttpBackend;
use util::exit_error;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "Stride CLI: drive chat, search and messaging against the Stride API"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "STRIDE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Bearer token for API requests
    #[arg(long, env = "STRIDE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(
        long,
        env = "STRIDE_LOG_JSON",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type a query keystroke by keystroke and print the settled results
    Search {
        /// What to search
        #[arg(value_enum)]
        kind: SearchKind,
        /// Full query text
        text: String,
        /// Delay between simulated keystrokes in milliseconds
        #[arg(long, default_value_t = 60)]
        keystroke_ms: u64,
    },
    /// Send one message and wait for the server to confirm it
    Send {
        /// Chat ID
        #[arg(long)]
        chat: String,
        /// Message text
        text: String,
    },
    /// Open a chat: print messages and send each stdin line
    ///
    /// Commands: /retry <tmp-id>, /discard <tmp-id>, /reload, /quit
    Chat {
        /// Chat ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    util::init_tracing(cli.log_json);

    let config = EngineConfig::from_env();
    if config.configured_via_env {
        tracing::debug!(?config, "engine config overridden from environment");
    }

    let backend = match HttpBackend::new(&cli.api_url, cli.token) {
        Ok(backend) => Arc::new(backend),
        Err(e) => exit_error(
            &format!("Invalid API URL '{}': {e}", cli.api_url),
            Some("Set --api-url or STRIDE_API_URL to an absolute http(s) URL"),
        ),
    };

    let code = match cli.command {
        Commands::Search {
            kind,
            text,
            keystroke_ms,
        } => commands::search::run(backend, config, kind, &text, keystroke_ms).await,
        Commands::Send { chat, text } => commands::send::run(backend, config, &chat, &text).await,
        Commands::Chat { id } => commands::chat::run(backend, config, &id).await,
    };

    std::process::exit(code);
}
