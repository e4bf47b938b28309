use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info};

use crate::process::{run_bounded, CommandExecutor};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("tempo adjustment failed: {0}")]
    Tempo(String),
    #[error("narration timed out")]
    Timeout,
}

pub type SpeechResult<T> = Result<T, SpeechError>;

/// Seam for the narration call; returns encoded audio bytes at the
/// backend's natural speaking tempo.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn narrate(&self, text: &str) -> SpeechResult<Vec<u8>>;
}

/// Free translate TTS endpoint, fixed to the configured locale.
pub struct GoogleTranslateTtsBackend {
    client: reqwest::Client,
    locale: String,
}

impl GoogleTranslateTtsBackend {
    pub fn new(locale: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for GoogleTranslateTtsBackend {
    async fn narrate(&self, text: &str) -> SpeechResult<Vec<u8>> {
        let response = self
            .client
            .get("https://translate.google.com/translate_tts")
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.locale.as_str()),
                ("q", text),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Produces a narration track and time-compresses it by the speed
/// factor (pitch approximately preserved via the transcoder's atempo
/// filter). Failure is a boolean, never an error past this boundary:
/// `false` means the scene has no narration and must be skipped.
pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    executor: Arc<dyn CommandExecutor>,
    ffmpeg: PathBuf,
    deadline: Duration,
    process_timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        executor: Arc<dyn CommandExecutor>,
        ffmpeg: PathBuf,
        deadline: Duration,
        process_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            executor,
            ffmpeg,
            deadline,
            process_timeout,
        }
    }

    pub async fn synthesize(&self, text: &str, dest: &Path, speed: f64) -> bool {
        let raw = dest.with_extension("raw.mp3");
        let result = self.narrate_and_compress(text, &raw, dest, speed).await;
        let _ = tokio::fs::remove_file(&raw).await;
        match result {
            Ok(()) => {
                info!(path = %dest.display(), speed, "narration synthesized");
                true
            }
            Err(err) => {
                error!(path = %dest.display(), error = %err, "speech synthesis failed");
                false
            }
        }
    }

    async fn narrate_and_compress(
        &self,
        text: &str,
        raw: &Path,
        dest: &Path,
        speed: f64,
    ) -> SpeechResult<()> {
        let bytes = timeout(self.deadline, self.backend.narrate(text))
            .await
            .map_err(|_| SpeechError::Timeout)??;
        tokio::fs::write(raw, &bytes)
            .await
            .map_err(|source| SpeechError::Io {
                source,
                path: raw.to_path_buf(),
            })?;

        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-i")
            .arg(raw)
            .arg("-filter:a")
            .arg(format!("atempo={speed}"))
            .arg("-vn")
            .arg(dest);
        let output = run_bounded(self.executor.as_ref(), &mut command, self.process_timeout)
            .await
            .map_err(|source| SpeechError::Io {
                source,
                path: dest.to_path_buf(),
            })?;
        if !output.status.success() {
            return Err(SpeechError::Tempo(format!(
                "transcoder exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
