//! Runs one student turn, or one evaluation, against a connection's conversation.
//!
//! Both take the conversation lock by ownership so they can be spawned off the
//! socket loop; holding the lock is what makes a second turn impossible while
//! one is in flight.

use super::protocol::ServerMessage;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, warn};
use tutor_core::{
    ConversationSession, Orchestrator, TutorError,
    evaluator::{EvaluationService, run_evaluation},
};

pub(super) const BUSY_MESSAGE: &str = "이전 답변을 기다리는 중입니다.";
pub(super) const SEND_FAILED: &str = "메시지 전송 중 오류가 발생했습니다.";
pub(super) const EVALUATION_FAILED: &str = "평가 중 오류가 발생했습니다.";

/// Everything one WebSocket connection owns.
pub(super) struct Conversation {
    pub orchestrator: Orchestrator,
    pub session: ConversationSession,
}

pub(super) async fn run_turn(mut guard: OwnedMutexGuard<Conversation>, text: String) -> ServerMessage {
    let conversation = &mut *guard;
    match conversation
        .orchestrator
        .send(&mut conversation.session, &text)
        .await
    {
        Ok(turn) => ServerMessage::TurnCommitted { turn },
        Err(TutorError::Busy) => ServerMessage::Error {
            message: BUSY_MESSAGE.to_string(),
        },
        Err(e) => {
            warn!(error = %e, "Turn failed");
            ServerMessage::Error {
                message: SEND_FAILED.to_string(),
            }
        }
    }
}

pub(super) async fn evaluate_conversation(
    guard: OwnedMutexGuard<Conversation>,
    evaluator: Arc<dyn EvaluationService>,
) -> ServerMessage {
    let turns = guard.session.transcript().turns().to_vec();
    drop(guard);

    match run_evaluation(evaluator.as_ref(), &turns).await {
        Ok(evaluation) => ServerMessage::Evaluation {
            evaluation: evaluation.raw,
            report: evaluation.record,
        },
        Err(e) => {
            error!(error = ?e, "Evaluation failed");
            ServerMessage::Error {
                message: EVALUATION_FAILED.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{FakeGateway, test_config};
    use tokio::sync::Mutex;
    use tutor_core::{
        ConversationState, Role,
        evaluator::StaticEvaluationService,
        gateway::AssistantGateway,
        poller::{OPENING_LINE, RunPoller},
    };

    async fn conversation(gateway: Arc<FakeGateway>) -> Arc<Mutex<Conversation>> {
        let config = test_config();
        let session = ConversationSession::open(gateway.as_ref(), &config.opening_line)
            .await
            .unwrap();
        let poller = RunPoller::new(gateway, config.poller_config());
        Arc::new(Mutex::new(Conversation {
            orchestrator: Orchestrator::new(poller, config.typing_tick),
            session,
        }))
    }

    #[tokio::test]
    async fn test_turn_commits_reply_and_prefixes_greeting() {
        let gateway = Arc::new(FakeGateway::replying("좋은 생각이에요!"));
        let conversation = conversation(gateway.clone()).await;

        let outcome = run_turn(
            conversation.clone().lock_owned().await,
            "공주는 약속을 지켜야 해요".to_string(),
        )
        .await;
        match outcome {
            ServerMessage::TurnCommitted { turn } => {
                assert_eq!(turn.role, Role::Assistant);
                assert_eq!(turn.content, "좋은 생각이에요!");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let conversation = conversation.lock().await;
        assert_eq!(conversation.orchestrator.state(), ConversationState::Idle);
        let turns = conversation.session.transcript().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].content, "공주는 약속을 지켜야 해요");

        let upstream = gateway.list_messages("thread_1").await.unwrap();
        let sent = &upstream[1].content;
        assert!(sent.starts_with(OPENING_LINE));
        assert!(sent.ends_with("공주는 약속을 지켜야 해요"));
    }

    #[tokio::test]
    async fn test_failed_turn_reports_fixed_message() {
        let gateway = Arc::new(FakeGateway::default());
        let conversation = conversation(gateway).await;
        // A gateway that refuses the message.
        {
            let mut guard = conversation.lock().await;
            let poller = RunPoller::new(
                Arc::new(FakeGateway {
                    fail: true,
                    ..Default::default()
                }),
                test_config().poller_config(),
            );
            guard.orchestrator = Orchestrator::new(poller, test_config().typing_tick);
        }

        let outcome = run_turn(conversation.clone().lock_owned().await, "안녕".to_string()).await;
        match outcome {
            ServerMessage::Error { message } => assert_eq!(message, SEND_FAILED),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            conversation.lock().await.orchestrator.state(),
            ConversationState::Idle
        );
    }

    #[tokio::test]
    async fn test_evaluation_uses_transcript() {
        let gateway = Arc::new(FakeGateway::default());
        let conversation = conversation(gateway).await;

        let outcome = evaluate_conversation(
            conversation.clone().lock_owned().await,
            Arc::new(StaticEvaluationService),
        )
        .await;
        match outcome {
            ServerMessage::Evaluation { report, .. } => assert_eq!(report.entries.len(), 4),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The lock is released once the transcript is copied.
        assert!(conversation.try_lock().is_ok());
    }
}
