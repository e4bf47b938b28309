use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::scratch::ScratchArea;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Seam for the generative image call. Implementations return the raw
/// image bytes so the synthesizer owns all filesystem effects.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> ImageResult<Vec<u8>>;
}

pub struct OpenAiImageBackend {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiImageBackend {
    pub fn new(api_key: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    async fn generate(&self, prompt: &str) -> ImageResult<Vec<u8>> {
        let body = serde_json::json!({
            "model": "dall-e-3",
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024"
        });
        let response = self
            .client
            .post("https://api.openai.com/v1/images/generations")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ImageError::Backend(format!(
                "image generation returned {status}: {detail}"
            )));
        }
        let payload: serde_json::Value = response.json().await?;
        let url = payload["data"][0]["url"]
            .as_str()
            .ok_or_else(|| ImageError::Backend("response missing image url".into()))?
            .to_string();

        let download = self.client.get(&url).send().await?.error_for_status()?;
        let mut stream = download.bytes_stream();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

/// Per-run keyed store `scene_id -> raw image path` plus the ordered
/// fallback pool. A single mutex serializes cache checks, file
/// creation, and pool appends, so concurrent scene tasks can never
/// synthesize the same scene twice.
#[derive(Default)]
pub struct SceneImageStore {
    inner: tokio::sync::Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    cache: BTreeMap<u32, PathBuf>,
    pool: Vec<PathBuf>,
}

impl StoreInner {
    fn record(&mut self, scene_id: u32, path: PathBuf) {
        if !self.pool.contains(&path) {
            self.pool.push(path.clone());
        }
        self.cache.insert(scene_id, path);
    }
}

impl SceneImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pool_len(&self) -> usize {
        self.inner.lock().await.pool.len()
    }
}

/// Scene-specific substitute search. Adjacent scenes carry the closest
/// narrative continuity, so they are preferred over the pool:
/// scene 1 scans 2, 3, 4; later scenes try their predecessor first and
/// then every other scene in ascending order. The pool is the last
/// resort when no scene has ever succeeded.
fn fallback_candidate(
    scene_id: u32,
    cache: &BTreeMap<u32, PathBuf>,
    pool: &[PathBuf],
) -> Option<PathBuf> {
    if scene_id == 1 {
        for candidate in 2..=4 {
            if let Some(path) = cache.get(&candidate) {
                return Some(path.clone());
            }
        }
    } else {
        if let Some(path) = cache.get(&(scene_id - 1)) {
            return Some(path.clone());
        }
        for candidate in 1..=4 {
            if candidate == scene_id {
                continue;
            }
            if let Some(path) = cache.get(&candidate) {
                return Some(path.clone());
            }
        }
    }
    pool.first().cloned()
}

/// Produces one raw image per scene: idempotent by scene id within a
/// run, substituting a previously generated image when the backend
/// fails, returning `None` only when no candidate exists at all.
pub struct ImageSynthesizer {
    backend: Arc<dyn ImageBackend>,
    deadline: Duration,
}

impl ImageSynthesizer {
    pub fn new(backend: Arc<dyn ImageBackend>, deadline: Duration) -> Self {
        Self { backend, deadline }
    }

    pub async fn synthesize(
        &self,
        dialogue: &str,
        scene_id: u32,
        store: &SceneImageStore,
        scratch: &ScratchArea,
    ) -> Option<PathBuf> {
        // The lock spans the whole operation: cache check, synthesis,
        // and substitution are one critical section per run.
        let mut state = store.inner.lock().await;

        if let Some(path) = state.cache.get(&scene_id) {
            info!(scene_id, path = %path.display(), "image cache hit");
            return Some(path.clone());
        }

        let dest = scratch.scene_image(scene_id);
        let prompt = broadcast_prompt(dialogue);
        match timeout(self.deadline, self.backend.generate(&prompt)).await {
            Ok(Ok(bytes)) => {
                if let Err(err) = tokio::fs::write(&dest, &bytes).await {
                    warn!(scene_id, path = %dest.display(), error = %err, "failed to persist generated image");
                    return substitute(scene_id, &dest, &mut state).await;
                }
                info!(scene_id, path = %dest.display(), "image generated");
                state.record(scene_id, dest.clone());
                Some(dest)
            }
            Ok(Err(err)) => {
                warn!(scene_id, error = %err, "image generation failed");
                substitute(scene_id, &dest, &mut state).await
            }
            Err(_) => {
                warn!(scene_id, deadline = ?self.deadline, "image generation timed out");
                substitute(scene_id, &dest, &mut state).await
            }
        }
    }
}

/// Copies the substitute under the scene's own filename so every later
/// stage stays keyed by scene id.
async fn substitute(scene_id: u32, dest: &Path, state: &mut StoreInner) -> Option<PathBuf> {
    let source = fallback_candidate(scene_id, &state.cache, &state.pool)?;
    if let Err(err) = tokio::fs::copy(&source, dest).await {
        warn!(scene_id, from = %source.display(), error = %err, "failed to copy substitute image");
        return None;
    }
    warn!(scene_id, from = %source.display(), "using substitute image");
    state.record(scene_id, dest.to_path_buf());
    Some(dest.to_path_buf())
}

fn broadcast_prompt(dialogue: &str) -> String {
    format!(
        "Generate a high quality, photorealistic 1024x1024 image in the style of a \
modern broadcast news report. Compose the frame so it could pass for a scene from \
a live news program or an online news article. The image must reflect the \
following news content: {dialogue}"
    )
}
