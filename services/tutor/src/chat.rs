use crate::report::render_report;
use anyhow::Result;
use std::{
    io::{Write, stdout},
    sync::Arc,
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tutor_core::{
    ConversationSession, Orchestrator, TutorError,
    evaluator::{EvaluationService, run_evaluation},
    gateway::AssistantGateway,
    poller::{PollerConfig, RunPoller},
};

const ASSISTANT_PREFIX: &str = "AI: ";

/// What to write so the terminal shows `frame`, given it already shows `printed`.
///
/// Frames that restart a longer animation are skipped until they grow past
/// what is on screen; a frame that disagrees with the screen is written out
/// again on a fresh line.
pub fn typing_delta(printed: &str, frame: &str) -> Option<String> {
    if let Some(rest) = frame.strip_prefix(printed) {
        return (!rest.is_empty()).then(|| rest.to_string());
    }
    if printed.starts_with(frame) {
        return None;
    }
    Some(format!("\n{ASSISTANT_PREFIX}{frame}"))
}

fn write_frame(printed: &mut String, frame: &str) -> Result<()> {
    if let Some(delta) = typing_delta(printed, frame) {
        if printed.is_empty() {
            print!("{ASSISTANT_PREFIX}");
        }
        print!("{delta}");
        stdout().flush()?;
        *printed = frame.to_string();
    }
    Ok(())
}

/// Runs the interactive conversation until `/quit` or end of input.
pub async fn run(
    gateway: Arc<dyn AssistantGateway>,
    evaluator: Arc<dyn EvaluationService>,
    poller_config: PollerConfig,
    typing_tick: Duration,
) -> Result<()> {
    let mut session = ConversationSession::open(gateway.as_ref(), &poller_config.opening_line).await?;
    info!(thread_id = %session.thread_id(), "Conversation started");
    println!("{ASSISTANT_PREFIX}{}", poller_config.opening_line);

    let mut orchestrator = Orchestrator::new(RunPoller::new(gateway, poller_config), typing_tick);
    let mut frames = orchestrator.animation();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/evaluate" => {
                match run_evaluation(evaluator.as_ref(), session.transcript().turns()).await {
                    Ok(evaluation) => println!("{}", render_report(&evaluation.record)),
                    Err(e) => eprintln!("평가 중 오류가 발생했습니다: {e:#}"),
                }
            }
            text => {
                let mut printed = String::new();
                let send = orchestrator.send(&mut session, text);
                tokio::pin!(send);
                let result: Result<_, TutorError> = loop {
                    tokio::select! {
                        result = &mut send => break result,
                        Ok(()) = frames.changed() => {
                            let frame = frames.borrow_and_update().displayed_prefix.clone();
                            write_frame(&mut printed, &frame)?;
                        }
                    }
                };
                match result {
                    Ok(turn) => {
                        write_frame(&mut printed, &turn.content)?;
                        println!();
                    }
                    Err(e) => {
                        if !printed.is_empty() {
                            println!();
                        }
                        eprintln!("메시지 전송 중 오류가 발생했습니다: {e}");
                    }
                }
            }
        }
    }
    Ok(())
}
