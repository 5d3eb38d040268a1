//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use sparc_core::{
    health::ConnectionStatus,
    session::{MessageId, SessionEvent, SessionSnapshot},
};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a session with the given scenario. Only valid while idle.
    SelectScenario { scenario_id: String },
    /// A trainee turn.
    UserMessage { text: String },
    /// Plays a message's audio again.
    Replay { message_id: MessageId },
    /// Ends the session and releases all audio.
    Reset,
    /// Flips speech for future replies.
    ToggleAudio,
    /// Probes the chat backend now.
    CheckStatus,
    /// The browser has decoded an `audio_data` payload and can play it.
    AudioReady { handle_id: u64 },
    /// Playback of a handle finished normally.
    PlaybackEnded { handle_id: u64 },
    /// Playback of a handle failed after it started.
    PlaybackError { handle_id: u64, message: String },
}

/// Messages sent from the server to the client (browser), other than
/// session events.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full session state, sent on connect.
    Snapshot { session: SessionSnapshot },
    /// Result of a backend probe.
    Status { status: ConnectionStatus },
    /// Synthesized audio for the browser to load (base64 encoded).
    AudioData {
        handle_id: u64,
        mime: String,
        data: String,
    },
    /// Start playing a previously loaded handle.
    PlayAudio { handle_id: u64 },
    /// A request could not be carried out.
    Error { message: String },
}

/// Everything written to the socket. Session events keep their own `type` tag.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum Outbound {
    Event(SessionEvent),
    Server(ServerMessage),
}

impl From<SessionEvent> for Outbound {
    fn from(event: SessionEvent) -> Self {
        Self::Event(event)
    }
}

impl From<ServerMessage> for Outbound {
    fn from(message: ServerMessage) -> Self {
        Self::Server(message)
    }
}
