use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::clip::{ClipAssembler, ClipConcatenator};
use crate::config::NewsreelConfig;
use crate::imaging::{ImageBackend, ImageSynthesizer, OpenAiImageBackend, SceneImageStore};
use crate::overlay::OverlayCompositor;
use crate::process::{CommandExecutor, SystemCommandExecutor};
use crate::scenario::{ChatBackend, OpenAiChatBackend, ScenarioGenerator, SCENE_COUNT};
use crate::scratch::ScratchArea;
use crate::speech::{GoogleTranslateTtsBackend, SpeechBackend, SpeechSynthesizer};

/// What the run produced. Both artifacts are independently optional:
/// a thumbnail can exist without a final video and the other way
/// around.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub final_video: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneOutcome {
    pub scene_id: u32,
    pub imaged: bool,
    pub clipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub title: String,
    pub scenes: Vec<SceneOutcome>,
    pub result: PipelineResult,
    pub completed_at: DateTime<Utc>,
}

/// Drives an article through scenario generation, per-scene media
/// production, and assembly. Every stage is best effort: a failing
/// scene is skipped, a failing artifact is reported as `None`, and the
/// run itself never errors.
pub struct Pipeline {
    config: NewsreelConfig,
    scratch: ScratchArea,
    scenario: ScenarioGenerator,
    imaging: ImageSynthesizer,
    compositor: OverlayCompositor,
    speech: SpeechSynthesizer,
    assembler: ClipAssembler,
    concatenator: ClipConcatenator,
}

impl Pipeline {
    /// Wires the live OpenAI and translate-TTS backends plus the real
    /// process executor.
    pub fn open_ai(config: NewsreelConfig, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let request_timeout = Duration::from_secs(config.video.request_timeout_seconds);
        let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiChatBackend::new(
            api_key.clone(),
            config.model.clone(),
            request_timeout,
        ));
        let image: Arc<dyn ImageBackend> =
            Arc::new(OpenAiImageBackend::new(api_key, request_timeout));
        let speech: Arc<dyn SpeechBackend> = Arc::new(GoogleTranslateTtsBackend::new(
            config.speech.locale.clone(),
            request_timeout,
        ));
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
        Self::with_backends(config, chat, image, speech, executor)
    }

    /// Assembles a pipeline from explicit backends and executor.
    pub fn with_backends(
        config: NewsreelConfig,
        chat: Arc<dyn ChatBackend>,
        image: Arc<dyn ImageBackend>,
        speech: Arc<dyn SpeechBackend>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let request_timeout = Duration::from_secs(config.video.request_timeout_seconds);
        let process_timeout = Duration::from_secs(config.video.process_timeout_seconds);
        let ffmpeg = PathBuf::from(&config.video.ffmpeg_binary);
        let scratch = ScratchArea::new(config.scratch_dir());
        Self {
            scenario: ScenarioGenerator::new(chat, request_timeout),
            imaging: ImageSynthesizer::new(image, request_timeout),
            compositor: OverlayCompositor::new(&config.font),
            speech: SpeechSynthesizer::new(
                speech,
                executor.clone(),
                ffmpeg.clone(),
                request_timeout,
                process_timeout,
            ),
            assembler: ClipAssembler::new(
                executor.clone(),
                ffmpeg.clone(),
                config.video.audio_bitrate.clone(),
                process_timeout,
            ),
            concatenator: ClipConcatenator::new(executor, ffmpeg, process_timeout),
            scratch,
            config,
        }
    }

    pub async fn run(&self, article_title: &str, article_body: &str) -> PipelineReport {
        if let Err(err) = tokio::fs::create_dir_all(self.config.output_dir()).await {
            error!(path = %self.config.output_dir().display(), error = %err, "cannot create output directory");
            return self.report("", Vec::new(), PipelineResult::default());
        }
        self.scratch.purge().await;

        let scenario = self
            .scenario
            .generate(article_title, article_body, &self.scratch)
            .await;
        if scenario.scenes.len() != SCENE_COUNT {
            error!(
                scenes = scenario.scenes.len(),
                "scenario has wrong scene count, aborting run"
            );
            self.scratch.purge().await;
            return self.report(&scenario.title, Vec::new(), PipelineResult::default());
        }

        let store = SceneImageStore::new();
        let mut images: BTreeMap<u32, PathBuf> = BTreeMap::new();
        for scene in &scenario.scenes {
            if let Some(path) = self
                .imaging
                .synthesize(&scene.dialogue, scene.id, &store, &self.scratch)
                .await
            {
                images.insert(scene.id, path);
            } else {
                warn!(scene_id = scene.id, "scene has no image");
            }
        }
        if images.is_empty() {
            error!("no scene produced an image, aborting run");
            self.scratch.purge().await;
            let scenes = scenario
                .scenes
                .iter()
                .map(|scene| SceneOutcome {
                    scene_id: scene.id,
                    imaged: false,
                    clipped: false,
                })
                .collect();
            return self.report(&scenario.title, scenes, PipelineResult::default());
        }

        let thumbnail = self.produce_thumbnail(&scenario.title, &images).await;

        let mut scenes = Vec::with_capacity(scenario.scenes.len());
        let mut clips = Vec::new();
        for scene in &scenario.scenes {
            let clip = match images.get(&scene.id) {
                Some(image) => self.produce_clip(scene.id, image, &scenario.title, &scene.dialogue).await,
                None => None,
            };
            let outcome = SceneOutcome {
                scene_id: scene.id,
                imaged: images.contains_key(&scene.id),
                clipped: clip.is_some(),
            };
            if let Some(clip) = clip {
                clips.push(clip);
            }
            scenes.push(outcome);
        }

        let final_video = self
            .concatenator
            .concatenate(
                &clips,
                &self.scratch.concat_manifest(),
                &self.config.final_video_path(),
            )
            .await;

        self.scratch.purge().await;
        self.report(
            &scenario.title,
            scenes,
            PipelineResult {
                final_video,
                thumbnail,
            },
        )
    }

    /// Thumbnail prefers the opening scene, then the lowest-numbered
    /// scene that has an image. Rendered into scratch first so a failed
    /// save never leaves a partial file in the output directory.
    async fn produce_thumbnail(
        &self,
        title: &str,
        images: &BTreeMap<u32, PathBuf>,
    ) -> Option<PathBuf> {
        let source = images.get(&1).or_else(|| images.values().next())?;
        let staged = self.scratch.thumbnail_overlay();
        if !self.compositor.overlay(source, title, &staged) {
            warn!("thumbnail composition failed");
            return None;
        }
        let dest = self.config.thumbnail_path();
        match tokio::fs::copy(&staged, &dest).await {
            Ok(_) => {
                info!(path = %dest.display(), "thumbnail written");
                Some(dest)
            }
            Err(err) => {
                warn!(path = %dest.display(), error = %err, "failed to publish thumbnail");
                None
            }
        }
    }

    async fn produce_clip(
        &self,
        scene_id: u32,
        image: &Path,
        title: &str,
        dialogue: &str,
    ) -> Option<PathBuf> {
        let overlay = self.scratch.scene_overlay(scene_id);
        if !self.compositor.overlay(image, title, &overlay) {
            warn!(scene_id, "overlay composition failed, skipping scene");
            return None;
        }
        let audio = self.scratch.scene_audio(scene_id);
        if !self
            .speech
            .synthesize(dialogue, &audio, self.config.speech.speed_factor)
            .await
        {
            warn!(scene_id, "narration failed, skipping scene");
            return None;
        }
        self.assembler
            .assemble(&overlay, &audio, &self.scratch.scene_clip(scene_id))
            .await
    }

    fn report(
        &self,
        title: &str,
        scenes: Vec<SceneOutcome>,
        result: PipelineResult,
    ) -> PipelineReport {
        PipelineReport {
            title: title.to_string(),
            scenes,
            result,
            completed_at: Utc::now(),
        }
    }
}
