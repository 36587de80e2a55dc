mod config;
mod error;

use std::io::{self, BufRead, Write};

use clap::Parser;
use runtime::{Agent, Backend, Channel, Router, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Config, Mode};
use error::Result;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Chat with a language model that can use MCP tools", long_about = None)]
#[command(version)]
struct Cli {}

/// The conversation loop selected by the configured mode.
enum Conversation<'s, B, C> {
    Tools(Agent<'s, B, C>),
    Router(Router<'s, B, C>),
}

impl<B: Backend, C: Channel> Conversation<'_, B, C> {
    async fn respond(&mut self, input: &str) -> String {
        match self {
            Self::Tools(agent) => agent.respond(input).await,
            Self::Router(router) => router.respond(input).await,
        }
    }
}

#[tokio::main]
async fn main() {
    Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so answers on stdout stay clean. `RUST_LOG` overrides
/// the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let config = Config::load()?;
    let backend = config.backend()?;

    println!("tether v{}", env!("CARGO_PKG_VERSION"));

    let session = Session::connect(config.server(), config.session_options()).await?;
    info!(server = %config.server.name, tools = session.catalog().len(), "tool host connected");
    println!(
        "Tool host: {} ({} tools)",
        config.server.name,
        session.catalog().len()
    );
    println!("Model: {backend}");

    let mut conversation = match config.agent.mode {
        Mode::Tools => {
            println!("Mode: tools");
            Conversation::Tools(Agent::new(backend, &session).with_options(config.agent_options()))
        }
        Mode::Router => {
            println!("Mode: router");
            Conversation::Router(Router::new(backend, &session).with_options(config.router_options()))
        }
    };
    println!("Type 'exit' or 'quit' (or Ctrl+D) to leave.\n");

    let outcome = repl(&mut conversation).await;
    drop(conversation);
    session.close().await;
    outcome
}

async fn repl<B: Backend, C: Channel>(conversation: &mut Conversation<'_, B, C>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        let answer = conversation.respond(input).await;
        println!("\n{answer}\n");
    }

    println!("\nBye.");
    Ok(())
}
