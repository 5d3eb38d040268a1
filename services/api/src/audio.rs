//! Audio outputs that live outside the browser, plus the payload encoding
//! shared with the WebSocket transport.

use async_trait::async_trait;
use base64::Engine;
use sparc_core::speech::{AudioHandle, AudioOutput, PlaybackEnd, SpeechError};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::info;

/// Encodes audio bytes for a JSON payload.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

/// "Plays" audio by writing it to a directory, one file per handle.
///
/// Used by the terminal trainer, which has no speaker of its own.
pub struct FileAudioOutput {
    dir: PathBuf,
}

impl FileAudioOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, handle: &AudioHandle) -> PathBuf {
        self.dir
            .join(format!("reply-{}.{}", handle.id(), extension_for(handle.mime())))
    }
}

#[async_trait]
impl AudioOutput for FileAudioOutput {
    async fn load(&self, handle: &AudioHandle) -> Result<(), SpeechError> {
        let bytes = handle
            .bytes()
            .ok_or_else(|| SpeechError::Playback("audio resource was released".into()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SpeechError::Playback(e.to_string()))?;
        tokio::fs::write(self.path_for(handle), &bytes)
            .await
            .map_err(|e| SpeechError::Playback(e.to_string()))
    }

    async fn start(&self, handle: &AudioHandle) -> Result<PlaybackEnd, SpeechError> {
        info!(path = %self.path_for(handle).display(), "Reply audio saved");
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(()));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_encode_base64() {
        assert_eq!(encode_base64(b"ID3"), "SUQz");
        assert_eq!(encode_base64(&[]), "");
    }

    #[tokio::test]
    async fn test_file_output_writes_and_ends() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileAudioOutput::new(dir.path().join("audio"));
        let handle = AudioHandle::new(Bytes::from_static(b"mp3 bytes"), "audio/mpeg");

        output.load(&handle).await.unwrap();
        let ended = output.start(&handle).await.unwrap();
        assert_eq!(ended.await.unwrap(), Ok(()));

        let path = output.path_for(&handle);
        assert_eq!(path.extension().unwrap(), "mp3");
        assert_eq!(std::fs::read(path).unwrap(), b"mp3 bytes");
    }

    #[tokio::test]
    async fn test_file_output_rejects_released_audio() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileAudioOutput::new(dir.path());
        let handle = AudioHandle::new(Bytes::from_static(b"x"), "audio/mpeg");
        handle.release();

        assert!(matches!(
            output.load(&handle).await,
            Err(SpeechError::Playback(_))
        ));
    }
}
