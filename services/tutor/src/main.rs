//! Terminal front-end of the reading-discussion tutor.
//!
//! `tutor chat` holds a conversation with the hosted assistant on stdin and
//! stdout, typing each reply out as it arrives. `tutor parse` runs the
//! evaluation parser over a saved report.

mod chat;
mod report;

use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;
use tutor_core::{
    evaluator::{
        DEFAULT_EVALUATION_TEMPLATE, EVALUATION_PROMPT_KEY, EvaluationService,
        LLMEvaluationService, StaticEvaluationService,
    },
    gateway::OpenAIAssistantGateway,
    parse_evaluation,
    poller::{OPENING_LINE, PollerConfig},
    typing::DEFAULT_TICK,
};

#[derive(Parser)]
#[command(name = "tutor", version)]
#[command(about = "Discuss a story with a hosted assistant and get an evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a conversation. `/evaluate` prints a report, `/quit` exits.
    Chat {
        /// Assistant to run; falls back to ASSISTANT_ID
        #[arg(long)]
        assistant_id: Option<String>,
        /// Delay between run status checks
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,
        /// Status checks before a run is abandoned
        #[arg(long, default_value = "120")]
        max_polls: u32,
        /// Model that writes the evaluation report
        #[arg(long, default_value = "gpt-4o")]
        model: String,
        /// Use a canned report instead of calling the model
        #[arg(long)]
        static_evaluation: bool,
    },
    /// Parse an evaluation report and print it as JSON
    Parse {
        /// Report file
        file: PathBuf,
    },
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Chat {
            assistant_id,
            poll_interval_ms,
            max_polls,
            model,
            static_evaluation,
        } => {
            let assistant_id = assistant_id
                .or_else(|| env_var("ASSISTANT_ID"))
                .context("No assistant id: pass --assistant-id or set ASSISTANT_ID")?;
            let api_key = env_var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(base) = env_var("OPENAI_API_BASE") {
                openai_config = openai_config.with_api_base(base);
            }

            let evaluator: Arc<dyn EvaluationService> = if static_evaluation {
                Arc::new(StaticEvaluationService)
            } else {
                let prompts = [(
                    EVALUATION_PROMPT_KEY.to_string(),
                    DEFAULT_EVALUATION_TEMPLATE.to_string(),
                )]
                .into_iter()
                .collect();
                Arc::new(LLMEvaluationService::new(
                    openai_config.clone(),
                    model,
                    prompts,
                ))
            };

            let poller_config = PollerConfig {
                assistant_id,
                opening_line: env_var("OPENING_LINE").unwrap_or_else(|| OPENING_LINE.to_string()),
                interval: Duration::from_millis(poll_interval_ms),
                max_polls: max_polls.max(1),
            };
            chat::run(
                Arc::new(OpenAIAssistantGateway::new(openai_config)),
                evaluator,
                poller_config,
                DEFAULT_TICK,
            )
            .await
        }
        Commands::Parse { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let record = parse_evaluation(&raw);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}
