use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::ModelSection;
use crate::scratch::ScratchArea;

pub const SCENE_COUNT: usize = 4;
pub const MAX_TITLE_CHARS: usize = 8;

const SYSTEM_PROMPT: &str = "You are a script writer for short-form news videos. \
Turn the given news article into a four-act storytelling news script \
(scenes 1 to 4: setup, development, turn, conclusion). Each scene must \
contain at least 20 words and read like a real news anchor reporting on \
air. Respond with a single JSON object of the form \
{\"title\": \"...\", \"scenes\": [{\"scene\": 1, \"dialogue\": \"...\"}, ...]} \
where the title is at most 8 characters long and there are exactly 4 scenes.";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("invalid scenario shape: {0}")]
    Shape(String),
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// One of exactly four narrative beats in the generated script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "scene")]
    pub id: u32,
    pub dialogue: String,
}

/// Structured four-scene script. Immutable once produced; every
/// downstream stage reads it without mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub scenes: Vec<Scene>,
}

impl Scenario {
    /// Fixed deterministic script used whenever generation fails, so the
    /// rest of the pipeline always has a structurally valid input.
    pub fn placeholder() -> Self {
        Self {
            title: "News".to_string(),
            scenes: vec![
                Scene {
                    id: 1,
                    dialogue: "Setup: a summary of the key facts reported in the article."
                        .to_string(),
                },
                Scene {
                    id: 2,
                    dialogue: "Development: how the situation unfolded and what was said."
                        .to_string(),
                },
                Scene {
                    id: 3,
                    dialogue: "Turn: the wider economic and political consequences at stake."
                        .to_string(),
                },
                Scene {
                    id: 4,
                    dialogue: "Conclusion: the outlook and what to watch for next.".to_string(),
                },
            ],
        }
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        if self.scenes.len() != SCENE_COUNT {
            return Err(ScenarioError::Shape(format!(
                "expected {SCENE_COUNT} scenes, got {}",
                self.scenes.len()
            )));
        }
        for (index, scene) in self.scenes.iter().enumerate() {
            let expected = index as u32 + 1;
            if scene.id != expected {
                return Err(ScenarioError::Shape(format!(
                    "scene {} out of order (expected {expected})",
                    scene.id
                )));
            }
            if scene.dialogue.trim().is_empty() {
                return Err(ScenarioError::Shape(format!("scene {} has no dialogue", scene.id)));
            }
        }
        if self.title.trim().is_empty() {
            return Err(ScenarioError::Shape("empty title".into()));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(ScenarioError::Shape(format!(
                "title exceeds {MAX_TITLE_CHARS} characters: {:?}",
                self.title
            )));
        }
        Ok(())
    }
}

/// Seam for the chat-completion call so tests can stub the model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> ScenarioResult<String>;
}

pub struct OpenAiChatBackend {
    client: reqwest::Client,
    api_key: String,
    model: ModelSection,
}

impl OpenAiChatBackend {
    pub fn new(api_key: impl Into<String>, model: ModelSection, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key: api_key.into(),
            model,
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn complete(&self, system: &str, user: &str) -> ScenarioResult<String> {
        let body = serde_json::json!({
            "model": self.model.name,
            "temperature": self.model.temperature,
            "max_tokens": self.model.max_tokens,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ScenarioError::Backend(format!(
                "chat completion returned {status}: {detail}"
            )));
        }
        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| ScenarioError::Backend("response missing message content".into()))
    }
}

/// Turns article text into a four-scene script. This is the one stage
/// where failure is fully absorbed: any transport, timeout, or shape
/// problem yields the placeholder scenario instead of an error.
pub struct ScenarioGenerator {
    backend: Arc<dyn ChatBackend>,
    deadline: Duration,
}

impl ScenarioGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, deadline: Duration) -> Self {
        Self { backend, deadline }
    }

    pub async fn generate(
        &self,
        article_title: &str,
        article_body: &str,
        scratch: &ScratchArea,
    ) -> Scenario {
        let scenario = match timeout(self.deadline, self.request(article_title, article_body)).await
        {
            Ok(Ok(scenario)) => {
                info!(title = %scenario.title, "scenario generated");
                scenario
            }
            Ok(Err(err)) => {
                error!(error = %err, "scenario generation failed, using placeholder");
                Scenario::placeholder()
            }
            Err(_) => {
                warn!(deadline = ?self.deadline, "scenario generation timed out, using placeholder");
                Scenario::placeholder()
            }
        };
        self.persist(&scenario, scratch).await;
        scenario
    }

    async fn request(&self, article_title: &str, article_body: &str) -> ScenarioResult<Scenario> {
        let user = format!("#News Title: {article_title}\n\n#News Article: {article_body}");
        let raw = self.backend.complete(SYSTEM_PROMPT, &user).await?;
        let cleaned = strip_code_fences(&raw);
        let scenario: Scenario = serde_json::from_str(cleaned)?;
        scenario.validate()?;
        Ok(scenario)
    }

    // Diagnostic artifact only; persistence failure never affects the run.
    async fn persist(&self, scenario: &Scenario, scratch: &ScratchArea) {
        let path = scratch.scenario_json();
        match serde_json::to_vec_pretty(scenario) {
            Ok(bytes) => {
                if let Err(err) = tokio::fs::write(&path, bytes).await {
                    warn!(path = %path.display(), error = %err, "failed to persist scenario");
                }
            }
            Err(err) => warn!(error = %err, "failed to serialize scenario"),
        }
    }
}

/// Models sometimes wrap JSON output in a markdown code fence.
fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
