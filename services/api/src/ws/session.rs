//! Manages the WebSocket connection lifecycle for one conversation.

use super::{
    protocol::{ClientMessage, ServerMessage},
    turn::{BUSY_MESSAGE, Conversation, evaluate_conversation, run_turn},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{Instrument, error, info, instrument, warn};
use tutor_core::{ConversationSession, Orchestrator, poller::RunPoller};

const INIT_FAILED: &str = "대화를 시작하지 못했습니다.";

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Opens a fresh upstream thread, announces it with `initialized`, and then
/// serves the conversation until the client goes away.
#[instrument(name = "ws_session", skip_all, fields(thread_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut socket_tx, socket_rx) = socket.split();

    let session =
        match ConversationSession::open(state.gateway.as_ref(), &state.config.opening_line).await
        {
            Ok(session) => session,
            Err(e) => {
                error!(error = ?e, "Failed to open conversation thread");
                let _ = send_msg(
                    &mut socket_tx,
                    ServerMessage::Error {
                        message: INIT_FAILED.to_string(),
                    },
                )
                .await;
                return;
            }
        };
    tracing::Span::current().record("thread_id", session.thread_id());
    info!("New WebSocket conversation.");

    if send_msg(
        &mut socket_tx,
        ServerMessage::Initialized {
            thread_id: session.thread_id().to_string(),
            transcript: session.transcript().clone(),
        },
    )
    .await
    .is_err()
    {
        error!("Failed to send Initialized message to client.");
        return;
    }

    let poller = RunPoller::new(state.gateway.clone(), state.config.poller_config());
    let conversation = Conversation {
        orchestrator: Orchestrator::new(poller, state.config.typing_tick),
        session,
    };
    if let Err(e) = run_conversation(state, socket_tx, socket_rx, conversation).await {
        error!(error = ?e, "Conversation terminated with error.");
    }
    info!("WebSocket conversation closed.");
}

/// The main event loop for an active conversation.
///
/// Turns and evaluations run in spawned tasks holding the conversation lock;
/// the loop itself keeps forwarding state changes and typing frames while
/// they run.
async fn run_conversation(
    state: Arc<AppState>,
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut socket_rx: SplitStream<WebSocket>,
    conversation: Conversation,
) -> Result<()> {
    let mut frames = conversation.orchestrator.animation();
    let mut states = conversation.orchestrator.states();
    let conversation = Arc::new(Mutex::new(conversation));
    let (outcome_tx, mut outcome_rx) = mpsc::channel::<ServerMessage>(8);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            msg = socket_rx.next() => {
                let Some(msg_result) = msg else {
                    info!("Client disconnected.");
                    break;
                };
                match msg_result {
                    Ok(Message::Text(text)) => {
                        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => client_msg,
                            Err(e) => {
                                warn!(error = %e, "Ignoring malformed client message.");
                                continue;
                            }
                        };
                        if let ClientMessage::UserMessage { text } = &client_msg
                            && text.trim().is_empty()
                        {
                            continue;
                        }
                        let Ok(guard) = conversation.clone().try_lock_owned() else {
                            send_msg(&mut socket_tx, ServerMessage::Error { message: BUSY_MESSAGE.to_string() }).await?;
                            continue;
                        };
                        let outcome_tx = outcome_tx.clone();
                        let evaluator = state.evaluator.clone();
                        tasks.retain(|task| !task.is_finished());
                        tasks.push(tokio::spawn(
                            async move {
                                let outcome = match client_msg {
                                    ClientMessage::UserMessage { text } => run_turn(guard, text).await,
                                    ClientMessage::Evaluate => evaluate_conversation(guard, evaluator).await,
                                };
                                let _ = outcome_tx.send(outcome).await;
                            }
                            .in_current_span(),
                        ));
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client sent close frame. Shutting down conversation.");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            Ok(()) = frames.changed() => {
                let frame = frames.borrow_and_update().clone();
                send_msg(&mut socket_tx, ServerMessage::Typing { text: frame.displayed_prefix, complete: frame.complete }).await?;
            },
            Ok(()) = states.changed() => {
                let current = *states.borrow_and_update();
                send_msg(&mut socket_tx, ServerMessage::State { state: current }).await?;
            },
            Some(outcome) = outcome_rx.recv() => {
                send_msg(&mut socket_tx, outcome).await?;
            },
        }
    }

    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
