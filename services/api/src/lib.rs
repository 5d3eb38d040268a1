//! SPARC-P API Library Crate
//!
//! This library contains the web service around the trainer core: the
//! application state, REST handlers, WebSocket sessions, and routing. The
//! binaries in `bin/` are thin wrappers around this library.

pub mod audio;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
