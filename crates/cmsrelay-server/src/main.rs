//! cmsrelay: provider-agnostic streaming chat relay grounded in Contentstack.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cmsrelay_chat::{ChatSession, TurnOutcome};
use cmsrelay_core::RelayConfig;
use cmsrelay_server::{build_router, AppState};

fn relay_url(config: &RelayConfig) -> String {
    std::env::var("CMSRELAY_URL")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("http://localhost:{}", config.port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = RelayConfig::from_env();

    if args.len() > 1 {
        match args[1].as_str() {
            "serve" => {}
            "ask" => {
                if args.len() < 3 {
                    eprintln!("Usage: cmsrelay ask <query>");
                    std::process::exit(1);
                }
                let query = args[2..].join(" ");
                let mut session = ChatSession::new(reqwest::Client::new(), &relay_url(&config));
                let outcome = run_turn(&mut session, &query).await?;
                std::process::exit(if outcome.is_failed() { 1 } else { 0 });
            }
            "chat" => {
                return repl(&config).await;
            }
            "--help" | "-h" | "help" => {
                println!("cmsrelay: streaming chat relay");
                println!();
                println!("Usage: cmsrelay [command]");
                println!();
                println!("Commands:");
                println!("  (none) | serve           Start the relay server");
                println!("  ask <query>              Send one query to a running relay");
                println!("  chat                     Interactive session (/reset, /quit)");
                println!("  help                     Show this help message");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'cmsrelay help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let port = config.port;
    let state = Arc::new(AppState::new(config));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("cmsrelay listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Send one query, echoing fragments to stdout as they arrive.
async fn run_turn(session: &mut ChatSession, query: &str) -> anyhow::Result<TurnOutcome> {
    let mut stdout = std::io::stdout();
    let outcome = session
        .send(query, None, |fragment| {
            stdout.write_all(fragment.as_bytes())?;
            stdout.flush()?;
            Ok(())
        })
        .await?;

    match &outcome {
        TurnOutcome::Completed(_) => println!(),
        TurnOutcome::Failed { message, .. } => {
            println!();
            eprintln!("turn failed: {}", message);
        }
    }
    Ok(outcome)
}

async fn repl(config: &RelayConfig) -> anyhow::Result<()> {
    let url = relay_url(config);
    let mut session = ChatSession::new(reqwest::Client::new(), &url);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Connected to {}. /reset clears the conversation, /quit exits.", url);

    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        match query {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                session.reset();
                eprintln!("(conversation cleared)");
            }
            _ => {
                if let Err(e) = run_turn(&mut session, query).await {
                    eprintln!("error: {}", e);
                }
            }
        }
    }

    Ok(())
}
