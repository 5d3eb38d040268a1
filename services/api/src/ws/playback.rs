//! Audio playback in the connected browser.
//!
//! Loading a handle ships its bytes to the browser as `audio_data` and waits
//! for `audio_ready`; starting it sends `play_audio`, and the browser's
//! `playback_ended`/`playback_error` completes the playback. The session's
//! load timeout bounds the wait for `audio_ready`.

use super::protocol::{Outbound, ServerMessage};
use crate::audio::encode_base64;
use async_trait::async_trait;
use sparc_core::speech::{AudioHandle, AudioOutput, PlaybackEnd, SpeechError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Ended = oneshot::Sender<Result<(), SpeechError>>;

#[derive(Default)]
struct Pending {
    ready: HashMap<u64, oneshot::Sender<()>>,
    ended: HashMap<u64, Ended>,
}

/// Removes a handle's ready slot if its load is abandoned (e.g. timed out).
struct ReadyGuard {
    pending: Arc<Mutex<Pending>>,
    handle_id: u64,
}

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.ready.remove(&self.handle_id);
        }
    }
}

pub struct BrowserAudioOutput {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Arc<Mutex<Pending>>,
}

impl BrowserAudioOutput {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    fn send(&self, message: ServerMessage) -> Result<(), SpeechError> {
        self.outbound
            .send(message.into())
            .map_err(|_| SpeechError::Playback("client disconnected".into()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Pending>, SpeechError> {
        self.pending
            .lock()
            .map_err(|_| SpeechError::Playback("playback state poisoned".into()))
    }

    /// The browser can play `handle_id`.
    pub fn ack_ready(&self, handle_id: u64) {
        let sender = self.lock().ok().and_then(|mut p| p.ready.remove(&handle_id));
        match sender {
            Some(tx) => {
                let _ = tx.send(());
            }
            None => debug!(handle_id, "Ignoring audio_ready for an unknown handle"),
        }
    }

    /// The browser finished playing `handle_id`, successfully or not.
    pub fn ack_ended(&self, handle_id: u64, result: Result<(), SpeechError>) {
        let sender = self.lock().ok().and_then(|mut p| p.ended.remove(&handle_id));
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(handle_id, "Ignoring playback end for an unknown handle"),
        }
    }
}

#[async_trait]
impl AudioOutput for BrowserAudioOutput {
    async fn load(&self, handle: &AudioHandle) -> Result<(), SpeechError> {
        let bytes = handle
            .bytes()
            .ok_or_else(|| SpeechError::Playback("audio resource was released".into()))?;
        let handle_id = handle.id();

        let (tx, rx) = oneshot::channel();
        self.lock()?.ready.insert(handle_id, tx);
        let _guard = ReadyGuard {
            pending: self.pending.clone(),
            handle_id,
        };

        self.send(ServerMessage::AudioData {
            handle_id,
            mime: handle.mime().to_string(),
            data: encode_base64(&bytes),
        })?;
        rx.await
            .map_err(|_| SpeechError::Playback("client went away before audio loaded".into()))
    }

    async fn start(&self, handle: &AudioHandle) -> Result<PlaybackEnd, SpeechError> {
        let handle_id = handle.id();
        let (tx, rx) = oneshot::channel();
        if let Some(stale) = self.lock()?.ended.insert(handle_id, tx) {
            warn!(handle_id, "Replacing an unfinished playback of the same audio");
            let _ = stale.send(Ok(()));
        }
        if let Err(e) = self.send(ServerMessage::PlayAudio { handle_id }) {
            self.lock()?.ended.remove(&handle_id);
            return Err(e);
        }
        Ok(rx)
    }
}
