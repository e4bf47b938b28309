pub mod clip;
pub mod config;
pub mod imaging;
pub mod overlay;
pub mod pipeline;
pub mod process;
pub mod scenario;
pub mod scratch;
pub mod speech;

pub use clip::{ClipAssembler, ClipConcatenator, ClipError};
pub use config::{
    load_config, ConfigError, FontSection, ModelSection, NewsreelConfig, PathsSection, Result,
    SpeechSection, VideoSection,
};
pub use imaging::{
    ImageBackend, ImageError, ImageSynthesizer, OpenAiImageBackend, SceneImageStore,
};
pub use overlay::OverlayCompositor;
pub use pipeline::{Pipeline, PipelineReport, PipelineResult, SceneOutcome};
pub use process::{run_bounded, CommandExecutor, SystemCommandExecutor};
pub use scenario::{
    ChatBackend, OpenAiChatBackend, Scenario, ScenarioError, ScenarioGenerator, Scene,
    SCENE_COUNT,
};
pub use scratch::ScratchArea;
pub use speech::{GoogleTranslateTtsBackend, SpeechBackend, SpeechError, SpeechSynthesizer};
