//! Manages the WebSocket connection lifecycle for a practice session.
//!
//! Each connection owns one `SessionOrchestrator`. Session events are
//! forwarded to the client as they happen; client requests that wait on a
//! backend (turns, replays, status probes) run as their own tasks so that a
//! reset or a playback ack is never stuck behind them.

use super::{
    playback::BrowserAudioOutput,
    protocol::{ClientMessage, Outbound, ServerMessage},
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
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use sparc_core::{
    session::SessionOrchestrator,
    speech::{AudioOutput, SpeechError},
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

const IGNORED_TURN: &str =
    "Message ignored: choose a scenario and wait for the current reply.";

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Everything a connection's message handlers need.
struct Connection {
    state: Arc<AppState>,
    orchestrator: SessionOrchestrator,
    output: Arc<BrowserAudioOutput>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        // Fails only once the writer is gone, i.e. the socket is closing.
        let _ = self.outbound.send(message.into());
    }

    fn error(&self, message: impl Into<String>) {
        self.send(ServerMessage::Error {
            message: message.into(),
        });
    }

    async fn handle(&self, message: ClientMessage) {
        match message {
            ClientMessage::SelectScenario { scenario_id } => {
                match self.state.scenarios.get_scenario(&scenario_id) {
                    Ok(scenario) => {
                        if !self.orchestrator.select_scenario(scenario).await {
                            self.error("A session is already running; reset it first.");
                        }
                    }
                    Err(e) => self.error(e.to_string()),
                }
            }
            ClientMessage::UserMessage { text } => {
                let orchestrator = self.orchestrator.clone();
                let outbound = self.outbound.clone();
                tokio::spawn(
                    async move {
                        if orchestrator.submit_user_turn(&text).await.is_none() {
                            let message = IGNORED_TURN.to_string();
                            let _ = outbound.send(ServerMessage::Error { message }.into());
                        }
                    }
                    .in_current_span(),
                );
            }
            ClientMessage::Replay { message_id } => {
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(
                    async move {
                        if !orchestrator.replay(message_id).await {
                            debug!(%message_id, "Replay not started");
                        }
                    }
                    .in_current_span(),
                );
            }
            ClientMessage::Reset => {
                self.orchestrator.reset().await;
            }
            ClientMessage::ToggleAudio => {
                self.orchestrator.toggle_audio().await;
            }
            ClientMessage::CheckStatus => {
                let monitor = self.state.monitor.clone();
                let outbound = self.outbound.clone();
                tokio::spawn(
                    async move {
                        let status = monitor.check_now().await;
                        let _ = outbound.send(ServerMessage::Status { status }.into());
                    }
                    .in_current_span(),
                );
            }
            ClientMessage::AudioReady { handle_id } => self.output.ack_ready(handle_id),
            ClientMessage::PlaybackEnded { handle_id } => self.output.ack_ended(handle_id, Ok(())),
            ClientMessage::PlaybackError { handle_id, message } => {
                warn!(handle_id, %message, "Browser reported a playback error");
                self.output
                    .ack_ended(handle_id, Err(SpeechError::Playback(message)));
            }
        }
    }
}

/// Main handler for an individual WebSocket connection.
#[instrument(name = "ws_session", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::Span::current().record("connection_id", &connection_id.to_string());
    info!("New WebSocket connection.");

    let (socket_tx, mut socket_rx) = socket.split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();

    let output = Arc::new(BrowserAudioOutput::new(outbound.clone()));
    let orchestrator = state.orchestrator(Some(output.clone() as Arc<dyn AudioOutput>));

    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());
    let forwarder = tokio::spawn(
        forward_events(orchestrator.subscribe(), outbound.clone()).in_current_span(),
    );

    let connection = Connection {
        state,
        orchestrator,
        output,
        outbound,
    };
    connection.send(ServerMessage::Snapshot {
        session: connection.orchestrator.snapshot().await,
    });
    if let Some(status) = connection.state.monitor.latest() {
        connection.send(ServerMessage::Status { status });
    }

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => connection.handle(message).await,
                Err(e) => {
                    warn!(error = %e, "Unparseable client message");
                    connection.error(format!("Invalid message: {e}"));
                }
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Binary(_)) => warn!("Ignoring unexpected binary message."),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }

    let released = connection.orchestrator.shutdown().await;
    forwarder.abort();
    writer.abort();
    info!(released_handles = released, "WebSocket connection closed and session torn down.");
}

/// Relays session events to the socket writer until either side goes away.
async fn forward_events(
    mut events: broadcast::Receiver<sparc_core::session::SessionEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if outbound.send(event.into()).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Client fell behind on session events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, &message).await {
            debug!(error = ?e, "Stopping socket writer");
            break;
        }
    }
}

/// A helper function to serialize and send an `Outbound` message to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: &Outbound,
) -> Result<()> {
    let serialized = serde_json::to_string(msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::scripted_state;
    use sparc_core::session::{SessionEvent, SessionPhase};

    fn connection() -> (Connection, mpsc::UnboundedReceiver<Outbound>) {
        let state = scripted_state();
        let (outbound, rx) = mpsc::unbounded_channel();
        let output = Arc::new(BrowserAudioOutput::new(outbound.clone()));
        let orchestrator = state.orchestrator(Some(output.clone() as Arc<dyn AudioOutput>));
        (
            Connection {
                state,
                orchestrator,
                output,
                outbound,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_unknown_scenario_reports_error() {
        let (connection, mut rx) = connection();
        connection
            .handle(ClientMessage::SelectScenario {
                scenario_id: "nope".into(),
            })
            .await;

        match rx.recv().await {
            Some(Outbound::Server(ServerMessage::Error { message })) => {
                assert_eq!(message, "Scenario 'nope' not found");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(connection.orchestrator.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_select_then_reset() {
        let (connection, _rx) = connection();
        connection
            .handle(ClientMessage::SelectScenario {
                scenario_id: "clear-coach".into(),
            })
            .await;
        assert_eq!(connection.orchestrator.phase().await, SessionPhase::Active);

        connection
            .handle(ClientMessage::SelectScenario {
                scenario_id: "hpv-initial".into(),
            })
            .await;
        let snapshot = connection.orchestrator.snapshot().await;
        assert_eq!(snapshot.scenario_id.as_deref(), Some("clear-coach"));

        connection.handle(ClientMessage::Reset).await;
        assert_eq!(connection.orchestrator.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_events_are_forwarded() {
        let (connection, mut rx) = connection();
        let forwarder = tokio::spawn(forward_events(
            connection.orchestrator.subscribe(),
            connection.outbound.clone(),
        ));

        connection.handle(ClientMessage::ToggleAudio).await;
        match rx.recv().await {
            Some(Outbound::Event(SessionEvent::AudioToggled { enabled })) => assert!(!enabled),
            other => panic!("expected audio_toggled, got {other:?}"),
        }
        forwarder.abort();
    }
}
