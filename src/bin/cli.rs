//! `continuity` CLI (§4.8.1): a thin driver over [`continuity::Engine`].

use std::sync::Arc;

use clap::{Parser, Subcommand};
use continuity::provider::{ChatTurn, NullProvider};
use continuity::search::SearchQuery;
use continuity::{Configuration, Engine, Result};

#[derive(Parser)]
#[command(name = "continuity")]
#[command(about = "Conversational long-term memory engine")]
#[command(version)]
struct Cli {
    #[arg(long, env = "CONTINUITY_DB_PATH", default_value = "continuity.db")]
    db_path: String,

    #[arg(long, env = "CONTINUITY_NAMESPACE", default_value = "default")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a chat turn
    Store {
        user_input: String,
        ai_output: String,
    },
    /// Search memories
    Search {
        query: String,
        #[arg(short, long, default_value = "fts")]
        strategy: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Run one consolidation sweep immediately
    Consolidate,
    /// Show engine statistics
    Stats,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Configuration::in_memory();
    config.database_url = cli.db_path.clone();
    config.namespace = cli.namespace.clone();

    match cli.command {
        Commands::Migrate => {
            continuity::Storage::open(&cli.db_path)?;
            println!("migrations applied to {}", cli.db_path);
            return Ok(());
        }
        _ => {}
    }

    let engine = Engine::open(config, Arc::new(NullProvider))?;

    match cli.command {
        Commands::Store { user_input, ai_output } => {
            let id = engine.store_chat(ChatTurn { user_input, ai_output, namespace: cli.namespace }).await?;
            println!("stored {id}");
        }
        Commands::Search { query, strategy, limit } => {
            let _ = strategy;
            let results = engine
                .search_memories(SearchQuery { text: query, namespace: cli.namespace, limit, ..Default::default() })
                .await?;
            for result in results {
                println!("{} ({:.3}, {}) - {}", result.id, result.score, result.strategy, truncate(&result.content, 80));
            }
        }
        Commands::Consolidate => {
            let candidates = engine.detect_duplicates(String::new(), cli.namespace).await.unwrap_or_default();
            println!("{} candidate(s) found", candidates.len());
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Migrate => unreachable!(),
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}
