use super::message::{Message, MessageId, MessageSnapshot};
use crate::feedback::FeedbackTagger;
use crate::llm_client::{ChatMessage, ResponseService};
use crate::scenario::Scenario;
use crate::speech::{AudioHandle, AudioPlayer, SpeechSynthesizer, Voice};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No scenario chosen.
    Idle,
    /// Scenario chosen and opening line seeded; ready for a turn.
    Active,
    /// A trainee turn is waiting for the persona's reply.
    TurnPending,
}

/// Change notifications for presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    ScenarioSelected { scenario_id: String },
    MessageAppended { message: MessageSnapshot },
    TurnPending,
    TurnCompleted { reply_id: MessageId, fallback: bool },
    AudioAttached { message_id: MessageId },
    PlaybackStarted { message_id: MessageId },
    PlaybackEnded { message_id: MessageId },
    AudioToggled { enabled: bool },
    SessionReset { released_handles: usize },
}

/// A consistent read-only copy of the whole session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub scenario_id: Option<String>,
    pub messages: Vec<MessageSnapshot>,
    pub audio_enabled: bool,
    pub currently_playing: Option<MessageId>,
}

/// What a completed `submit_user_turn` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub user_id: MessageId,
    /// `None` when the session was reset before the reply arrived.
    pub reply_id: Option<MessageId>,
    pub fallback: bool,
}

/// The speech collaborators; sessions without them never synthesize audio.
#[derive(Clone)]
pub struct SpeechServices {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: AudioPlayer,
}

struct SessionState {
    /// Bumped on every reset; work started under an older epoch is stale.
    epoch: u64,
    phase: SessionPhase,
    scenario: Option<Arc<Scenario>>,
    messages: Vec<Message>,
    audio_enabled: bool,
    currently_playing: Option<MessageId>,
    last_id: Option<MessageId>,
}

impl SessionState {
    fn next_id(&mut self, now: DateTime<Utc>) -> MessageId {
        let id = MessageId::next(self.last_id, now);
        self.last_id = Some(id);
        id
    }

    /// Detaches and releases every handle still attached to a message.
    fn release_audio(&mut self) -> usize {
        self.messages
            .iter_mut()
            .filter_map(|m| m.audio.take())
            .filter(|handle| handle.release())
            .count()
    }
}

struct Inner {
    state: Mutex<SessionState>,
    responder: Arc<dyn ResponseService>,
    tagger: Arc<dyn FeedbackTagger>,
    speech: Option<SpeechServices>,
    events: broadcast::Sender<SessionEvent>,
    audio_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns one practice session: its messages, turn sequencing and audio.
///
/// All mutation goes through the operations below; presentation code reads
/// snapshots and subscribes to `SessionEvent`s. The state lock is never held
/// across a backend call, so a reset can always proceed while a reply or a
/// synthesis is in flight.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn new(
        responder: Arc<dyn ResponseService>,
        tagger: Arc<dyn FeedbackTagger>,
        speech: Option<SpeechServices>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    epoch: 0,
                    phase: SessionPhase::Idle,
                    scenario: None,
                    messages: Vec::new(),
                    audio_enabled: true,
                    currently_playing: None,
                    last_id: None,
                }),
                responder,
                tagger,
                speech,
                events,
                audio_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.state.lock().await;
        SessionSnapshot {
            phase: st.phase,
            scenario_id: st.scenario.as_ref().map(|s| s.id.clone()),
            messages: st
                .messages
                .iter()
                .map(|m| m.snapshot(st.currently_playing))
                .collect(),
            audio_enabled: st.audio_enabled,
            currently_playing: st.currently_playing,
        }
    }

    /// The audio attached to a message, if synthesis has finished.
    pub async fn audio_handle(&self, message_id: MessageId) -> Option<AudioHandle> {
        let st = self.inner.state.lock().await;
        st.messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| m.audio.clone())
    }

    /// Starts a session for `scenario` and seeds the persona's opening line.
    ///
    /// Only valid while idle; returns `false` otherwise.
    #[instrument(skip_all, fields(scenario_id = %scenario.id))]
    pub async fn select_scenario(&self, scenario: Arc<Scenario>) -> bool {
        let greeting = {
            let mut st = self.inner.state.lock().await;
            if st.phase != SessionPhase::Idle {
                warn!(
                    phase = ?st.phase,
                    "Ignoring scenario selection: a session is already running"
                );
                return false;
            }
            let now = Utc::now();
            let id = st.next_id(now);
            let greeting = Message::avatar(id, scenario.opening_line(), now, None);
            let snapshot = greeting.snapshot(None);
            st.messages = vec![greeting];
            st.scenario = Some(scenario.clone());
            st.phase = SessionPhase::Active;
            snapshot
        };

        info!(persona = %scenario.persona.name, "Session started");
        self.inner.emit(SessionEvent::ScenarioSelected {
            scenario_id: scenario.id.clone(),
        });
        self.inner
            .emit(SessionEvent::MessageAppended { message: greeting });
        true
    }

    /// Runs one trainee turn: append the trainee's message, fetch the
    /// persona's reply, append it with feedback tags, and kick off speech.
    ///
    /// Returns `None` without side effects when the session is not ready for
    /// a turn (idle, or another turn pending) or `text` is blank.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub async fn submit_user_turn(&self, text: &str) -> Option<TurnOutcome> {
        let (epoch, scenario, history, user_message) = {
            let mut st = self.inner.state.lock().await;
            if st.phase != SessionPhase::Active {
                debug!(phase = ?st.phase, "Ignoring turn: session not ready");
                return None;
            }
            if text.trim().is_empty() {
                return None;
            }
            let scenario = st.scenario.clone()?;
            let history: Vec<ChatMessage> =
                st.messages.iter().map(Message::to_chat_message).collect();

            let now = Utc::now();
            let id = st.next_id(now);
            let message = Message::user(id, text.to_string(), now);
            let snapshot = message.snapshot(st.currently_playing);
            st.messages.push(message);
            st.phase = SessionPhase::TurnPending;
            (st.epoch, scenario, history, snapshot)
        };
        let user_id = user_message.id;
        self.inner.emit(SessionEvent::MessageAppended {
            message: user_message,
        });
        self.inner.emit(SessionEvent::TurnPending);

        let reply = self
            .inner
            .responder
            .complete(&history, text, &scenario.id)
            .await;
        let fallback = reply.is_fallback();
        let tags = self.inner.tagger.tag(text);

        let (reply_message, speak) = {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                info!("Session was reset while the reply was in flight; discarding it");
                return Some(TurnOutcome {
                    user_id,
                    reply_id: None,
                    fallback,
                });
            }
            let now = Utc::now();
            let id = st.next_id(now);
            let clear_components = (!tags.is_empty()).then_some(tags);
            let message = Message::avatar(id, reply.content, now, clear_components);
            let snapshot = message.snapshot(st.currently_playing);
            st.messages.push(message);
            st.phase = SessionPhase::Active;

            let speak = match (&self.inner.speech, scenario.voice) {
                (Some(_), Some(voice)) if st.audio_enabled => Some(voice),
                _ => None,
            };
            (snapshot, speak)
        };

        let reply_id = reply_message.id;
        let content = reply_message.content.clone();
        self.inner.emit(SessionEvent::MessageAppended {
            message: reply_message,
        });
        self.inner
            .emit(SessionEvent::TurnCompleted { reply_id, fallback });

        if let Some(voice) = speak {
            let task = tokio::spawn(
                Arc::clone(&self.inner).speak_reply(epoch, reply_id, content, voice),
            );
            self.inner.track(task).await;
        }

        Some(TurnOutcome {
            user_id,
            reply_id: Some(reply_id),
            fallback,
        })
    }

    /// Plays a message's audio again.
    ///
    /// A no-op (returning `false`) when the message has no audio or any
    /// message is already playing; audio streams never overlap.
    #[instrument(skip(self))]
    pub async fn replay(&self, message_id: MessageId) -> bool {
        let (epoch, handle) = {
            let st = self.inner.state.lock().await;
            if let Some(playing) = st.currently_playing {
                debug!(%playing, "Ignoring replay: audio already playing");
                return false;
            }
            let handle = st
                .messages
                .iter()
                .find(|m| m.id == message_id)
                .and_then(|m| m.audio.clone());
            match handle {
                Some(handle) => (st.epoch, handle),
                None => return false,
            }
        };
        self.inner.start_playback(epoch, message_id, handle).await
    }

    /// Ends the session from any state, releasing all audio.
    ///
    /// Returns how many handles this call released; calling it again
    /// releases nothing.
    pub async fn reset(&self) -> usize {
        let released = {
            let mut st = self.inner.state.lock().await;
            st.epoch += 1;
            let released = st.release_audio();
            st.messages.clear();
            st.scenario = None;
            st.currently_playing = None;
            st.phase = SessionPhase::Idle;
            released
        };
        info!(released_handles = released, "Session reset");
        self.inner.emit(SessionEvent::SessionReset {
            released_handles: released,
        });
        released
    }

    /// Flips speech for future replies. Returns the new setting.
    pub async fn toggle_audio(&self) -> bool {
        let enabled = {
            let mut st = self.inner.state.lock().await;
            st.audio_enabled = !st.audio_enabled;
            st.audio_enabled
        };
        info!(enabled, "Audio toggled");
        self.inner.emit(SessionEvent::AudioToggled { enabled });
        enabled
    }

    /// Waits for all background audio work, including playback still running.
    pub async fn settle_audio(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.audio_tasks.lock().await);
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
    }

    /// Tears the session down: resets it and stops background audio work.
    pub async fn shutdown(&self) -> usize {
        let released = self.reset().await;
        for task in std::mem::take(&mut *self.inner.audio_tasks.lock().await) {
            task.abort();
        }
        released
    }
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.audio_tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Synthesizes a reply, attaches the audio to its message and plays it.
    async fn speak_reply(
        self: Arc<Self>,
        epoch: u64,
        message_id: MessageId,
        text: String,
        voice: Voice,
    ) {
        let Some(speech) = self.speech.as_ref() else {
            return;
        };
        let handle = match speech.synthesizer.synthesize(&text, voice).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, %message_id, "Speech synthesis failed; continuing without audio");
                return;
            }
        };

        let attached = {
            let mut st = self.state.lock().await;
            let current = st.epoch == epoch;
            match st.messages.iter_mut().find(|m| m.id == message_id) {
                Some(message) if current => {
                    if let Some(previous) = message.audio.replace(handle.clone()) {
                        previous.release();
                    }
                    true
                }
                _ => false,
            }
        };
        if !attached {
            debug!(%message_id, "Message gone before its audio arrived; releasing");
            handle.release();
            return;
        }

        self.emit(SessionEvent::AudioAttached { message_id });
        self.start_playback(epoch, message_id, handle).await;
    }

    /// Claims the single playback slot and starts `handle`. Returns whether
    /// playback began.
    async fn start_playback(
        self: &Arc<Self>,
        epoch: u64,
        message_id: MessageId,
        handle: AudioHandle,
    ) -> bool {
        let Some(speech) = self.speech.as_ref() else {
            return false;
        };
        {
            let mut st = self.state.lock().await;
            if st.epoch != epoch {
                return false;
            }
            if let Some(playing) = st.currently_playing {
                debug!(%playing, %message_id, "Audio already playing; not starting another");
                return false;
            }
            st.currently_playing = Some(message_id);
        }

        match speech.player.play(&handle).await {
            Ok(ended) => {
                self.emit(SessionEvent::PlaybackStarted { message_id });
                let inner = Arc::clone(self);
                let watcher = tokio::spawn(async move {
                    match ended.await {
                        Ok(Ok(())) => debug!(%message_id, "Audio playback ended"),
                        Ok(Err(e)) => warn!(error = %e, %message_id, "Audio playback error"),
                        Err(_) => debug!(%message_id, "Audio output closed during playback"),
                    }
                    inner.finish_playback(epoch, message_id).await;
                });
                self.track(watcher).await;
                true
            }
            Err(e) => {
                warn!(error = %e, %message_id, "Audio playback failed; continuing without audio");
                let mut st = self.state.lock().await;
                if st.epoch == epoch && st.currently_playing == Some(message_id) {
                    st.currently_playing = None;
                }
                false
            }
        }
    }

    async fn finish_playback(&self, epoch: u64, message_id: MessageId) {
        let finished = {
            let mut st = self.state.lock().await;
            let finished = st.epoch == epoch && st.currently_playing == Some(message_id);
            if finished {
                st.currently_playing = None;
            }
            finished
        };
        if finished {
            self.emit(SessionEvent::PlaybackEnded { message_id });
        }
    }
}
