//! WebSocket Session Management
//!
//! This module contains the logic for running practice sessions over
//! WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `playback`: Plays session audio in the browser, driven by client acknowledgements.

pub mod playback;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
