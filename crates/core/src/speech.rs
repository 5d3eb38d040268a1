//! Speech Service
//!
//! Text-to-speech for the personas that have a registered voice, and the
//! playback side of that audio. Synthesized audio is wrapped in an
//! `AudioHandle` that owns the bytes and a revocable resource URL; whoever
//! holds the handle is responsible for releasing it.
//!
//! Playback is split into an `AudioOutput` (where the sound actually goes:
//! a browser, a file, a test double) and the `AudioPlayer`, which applies the
//! load timeout and resolves once playback has begun.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument};

/// How long audio may take to become playable before giving up.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

const TTS_MODEL_ID: &str = "eleven_multilingual_v2";
const TTS_OUTPUT_FORMAT: &str = "mp3_44100_128";
const AUDIO_MIME: &str = "audio/mpeg";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Failed to generate speech: {0}")]
    Synthesis(String),
    #[error("Audio loading timeout after {0:?}")]
    LoadTimeout(Duration),
    #[error("Audio playback failed: {0}")]
    Playback(String),
}

/// The personas that have a pre-registered synthesized voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Anne,
    Maya,
}

impl Voice {
    pub fn voice_id(&self) -> &'static str {
        match self {
            Voice::Anne => "21m00Tcm4TlvDq8ikWAM",
            Voice::Maya => "EXAVITQu4vr4xnSDxMaL",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Voice::Anne => "Anne Palmer",
            Voice::Maya => "Maya Pena",
        }
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct HandleInner {
    id: u64,
    bytes: Bytes,
    mime: &'static str,
    released: AtomicBool,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(handle_id = self.id, "Audio handle dropped without release; revoking");
        }
    }
}

/// Owned synthesized audio plus a revocable reference to it.
///
/// Clones share the same underlying resource, so releasing any clone revokes
/// it for all of them.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    inner: Arc<HandleInner>,
}

impl AudioHandle {
    pub fn new(bytes: Bytes, mime: &'static str) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::new(HandleInner {
                id,
                bytes,
                mime,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn mime(&self) -> &'static str {
        self.inner.mime
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// The audio bytes, or `None` once revoked.
    pub fn bytes(&self) -> Option<Bytes> {
        (!self.is_released()).then(|| self.inner.bytes.clone())
    }

    /// Revokes the resource. Returns `true` only for the call that released it.
    pub fn release(&self) -> bool {
        let first = !self.inner.released.swap(true, Ordering::AcqRel);
        if first {
            debug!(handle_id = self.inner.id, "Released audio handle");
        }
        first
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

/// Converts text to audio in a persona's voice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<AudioHandle, SpeechError>;
}

/// Resolves when playback ends, with any error reported after it started.
pub type PlaybackEnd = oneshot::Receiver<Result<(), SpeechError>>;

/// Where audio is played.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Prepares the resource and resolves once it can play.
    async fn load(&self, handle: &AudioHandle) -> Result<(), SpeechError>;

    /// Starts playback and resolves once it has begun.
    async fn start(&self, handle: &AudioHandle) -> Result<PlaybackEnd, SpeechError>;
}

/// Plays audio handles through an `AudioOutput` with a bounded load wait.
#[derive(Clone)]
pub struct AudioPlayer {
    output: Arc<dyn AudioOutput>,
    load_timeout: Duration,
}

impl AudioPlayer {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            load_timeout: LOAD_TIMEOUT,
        }
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Waits for the audio to be ready, starts it, and resolves once it is playing.
    ///
    /// The returned receiver reports the end of playback.
    #[instrument(skip_all, fields(handle_id = handle.id()))]
    pub async fn play(&self, handle: &AudioHandle) -> Result<PlaybackEnd, SpeechError> {
        if handle.is_released() {
            return Err(SpeechError::Playback("audio resource was released".into()));
        }
        match tokio::time::timeout(self.load_timeout, self.output.load(handle)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(timeout = ?self.load_timeout, "Audio loading timeout");
                return Err(SpeechError::LoadTimeout(self.load_timeout));
            }
        }
        let ended = self.output.start(handle).await?;
        info!("Audio started playing");
        Ok(ended)
    }
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[derive(Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// A `SpeechSynthesizer` for the ElevenLabs text-to-speech API.
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ElevenLabsSynthesizer {
    /// A missing key is reported as a synthesis error on first use.
    pub fn new(api_key: Option<String>, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<AudioHandle, SpeechError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| SpeechError::Synthesis("no text-to-speech API key configured".into()))?;

        let url = format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url,
            voice.voice_id(),
            TTS_OUTPUT_FORMAT
        );
        let body = TextToSpeechRequest {
            text,
            model_id: TTS_MODEL_ID,
            voice_settings: VoiceSettings {
                stability: 0.6,
                similarity_boost: 0.75,
                style: 0.0,
                use_speaker_boost: true,
            },
        };

        let response = self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, AUDIO_MIME)
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, %detail, "Text-to-speech request rejected");
            return Err(SpeechError::Synthesis(format!("{status}: {detail}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SpeechError::Synthesis("empty audio stream".into()));
        }
        debug!(voice = voice.display_name(), bytes = bytes.len(), "Synthesized speech");
        Ok(AudioHandle::new(bytes, AUDIO_MIME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// An output whose load and start behaviour is scripted per test.
    struct ScriptedOutput {
        load: Result<(), SpeechError>,
        load_delay: Duration,
        started: Mutex<Vec<u64>>,
    }

    impl ScriptedOutput {
        fn ready() -> Self {
            Self {
                load: Ok(()),
                load_delay: Duration::ZERO,
                started: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AudioOutput for ScriptedOutput {
        async fn load(&self, _handle: &AudioHandle) -> Result<(), SpeechError> {
            tokio::time::sleep(self.load_delay).await;
            self.load.clone()
        }

        async fn start(&self, handle: &AudioHandle) -> Result<PlaybackEnd, SpeechError> {
            self.started.lock().unwrap().push(handle.id());
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Ok(()));
            Ok(rx)
        }
    }

    fn handle() -> AudioHandle {
        AudioHandle::new(Bytes::from_static(b"ID3fake"), AUDIO_MIME)
    }

    #[test]
    fn test_release_is_exactly_once_across_clones() {
        let handle = handle();
        let clone = handle.clone();
        assert_eq!(handle.bytes().unwrap().len(), 7);

        assert!(clone.release());
        assert!(!handle.release());
        assert!(handle.is_released());
        assert!(handle.bytes().is_none());
    }

    #[test]
    fn test_handle_ids_are_unique() {
        assert_ne!(handle().id(), handle().id());
    }

    #[tokio::test]
    async fn test_play_resolves_once_started() {
        let output = Arc::new(ScriptedOutput::ready());
        let player = AudioPlayer::new(output.clone());
        let handle = handle();

        let ended = player.play(&handle).await.unwrap();
        assert_eq!(*output.started.lock().unwrap(), vec![handle.id()]);
        assert_eq!(ended.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_play_times_out_when_never_ready() {
        let output = Arc::new(ScriptedOutput {
            load_delay: Duration::from_secs(5),
            ..ScriptedOutput::ready()
        });
        let player = AudioPlayer::new(output.clone()).with_load_timeout(Duration::from_millis(20));

        let err = player.play(&handle()).await.unwrap_err();
        assert_eq!(err, SpeechError::LoadTimeout(Duration::from_millis(20)));
        assert!(output.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_play_reports_load_errors() {
        let output = Arc::new(ScriptedOutput {
            load: Err(SpeechError::Playback("decode failed".into())),
            ..ScriptedOutput::ready()
        });
        let err = AudioPlayer::new(output).play(&handle()).await.unwrap_err();
        assert_eq!(err, SpeechError::Playback("decode failed".into()));
    }

    #[tokio::test]
    async fn test_released_handle_cannot_play() {
        let handle = handle();
        handle.release();
        let err = AudioPlayer::new(Arc::new(ScriptedOutput::ready()))
            .play(&handle)
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Playback(_)));
    }

    #[tokio::test]
    async fn test_synthesizer_without_key_fails_at_first_use() {
        let synth = ElevenLabsSynthesizer::new(None, "https://api.elevenlabs.io/".into());
        let err = synth.synthesize("Hello", Voice::Anne).await.unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis(_)));
    }

    #[test]
    fn test_voice_registry() {
        assert_eq!(Voice::Anne.voice_id(), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(Voice::Maya.display_name(), "Maya Pena");
        assert_eq!(serde_json::to_string(&Voice::Maya).unwrap(), "\"maya\"");
    }
}
