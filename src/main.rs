use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scamradar::clients::openai::OpenAiClient;
use scamradar::clients::qdrant::QdrantIndex;
use scamradar::clients::safe_browsing::SafeBrowsingClient;
use scamradar::config::Config;
use scamradar::core::pipeline::DetectionPipeline;
use scamradar::db::SharedDatabase;
use scamradar::signals::DetectionBudget;

#[derive(Parser, Debug)]
#[command(name = "scamradar", version, about = "Scam risk classifier for URLs and reported cases")]
struct Cli {
    #[arg(long, default_value = "config.toml", help = "Path to the TOML config")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a URL.
    Url { url: String },
    /// Classify a free-text case description.
    Case {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show recent detections.
    History {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(
            "scamradar=info".parse().expect("static directive"),
        ))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config);
    tracing::debug!("Config: {:?}", config);

    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create database directory: {e}");
        }
    }
    let db = match SharedDatabase::open(db_path) {
        Ok(db) => Some(db),
        Err(e) => {
            tracing::warn!("History database unavailable at {}: {e}", db_path.display());
            None
        }
    };

    if let Commands::History { limit } = cli.command {
        let Some(db) = db else {
            eprintln!("history database unavailable");
            return ExitCode::FAILURE;
        };
        return match db.recent_detections(limit) {
            Ok(records) => print_json(&records),
            Err(e) => {
                eprintln!("failed to read history: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if config.openai.api_key.is_none() && config.detection.enable_openai {
        tracing::warn!("OPENAI_API_KEY not set, LLM escalation disabled");
        config.detection.enable_openai = false;
    }
    if config.blocklist.api_key.is_none() {
        tracing::warn!("SAFE_BROWSING_API_KEY not set, blocklist lookups will fail open");
    }

    let clients = (
        SafeBrowsingClient::new(&config.blocklist),
        QdrantIndex::new(&config.vector),
        OpenAiClient::new(&config.openai),
    );
    let (blocklist, index, llm) = match clients {
        (Ok(b), Ok(i), Ok(l)) => (b, i, l),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            eprintln!("failed to build HTTP clients: {e}");
            return ExitCode::FAILURE;
        }
    };

    let budget = Arc::new(DetectionBudget::new(
        config.detection.max_openai_calls_per_day,
        config.detection.openai_cost_limit,
        config.detection.single_call_cost_limit,
    ));
    if let Some(db) = &db {
        match db.load_budget(Utc::now().date_naive()) {
            Ok(Some(saved)) => {
                tracing::info!(calls_used = saved.calls_used, cost_used = saved.cost_used, "Resumed today's LLM budget");
                budget.restore(saved);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load LLM budget: {e}"),
        }
    }
    let mut pipeline = DetectionPipeline::new(
        &config,
        Arc::new(blocklist),
        Arc::new(index),
        Arc::new(llm),
        budget,
    );
    if let Some(db) = db {
        pipeline = pipeline.with_history(db);
    }

    let outcome = match cli.command {
        Commands::Url { url } => pipeline.detect_url(&url).await,
        Commands::Case { text } => pipeline.detect_case(&text.join(" ")).await,
        Commands::History { .. } => unreachable!("handled above"),
    };
    match outcome {
        Ok(result) => print_json(&result),
        Err(e) => {
            eprintln!("invalid input: {e}");
            ExitCode::from(2)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to encode output: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("scamradar").chain(args.iter().copied()))
    }

    #[test]
    fn parses_commands() {
        let cli = parse(&["url", "http://a.example"]).unwrap();
        assert!(matches!(cli.command, Commands::Url { url } if url == "http://a.example"));

        let cli = parse(&["case", "pay", "now"]).unwrap();
        assert!(matches!(cli.command, Commands::Case { text } if text.join(" ") == "pay now"));

        assert!(matches!(parse(&["history"]).unwrap().command, Commands::History { limit: 20 }));
        assert!(matches!(parse(&["history", "5"]).unwrap().command, Commands::History { limit: 5 }));
        assert_eq!(parse(&["--config", "alt.toml", "history"]).unwrap().config, "alt.toml");
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(parse(&["history", "x"]).is_err());
        assert!(parse(&["url"]).is_err());
        assert!(parse(&["case"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
