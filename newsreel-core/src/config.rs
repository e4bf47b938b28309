use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("{path} is not a valid newsreel config: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("rejected value in {section}: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewsreelConfig {
    pub paths: PathsSection,
    pub font: FontSection,
    pub model: ModelSection,
    pub speech: SpeechSection,
    pub video: VideoSection,
}

impl NewsreelConfig {
    /// Root directory of the two well-known output artifacts.
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_dir)
    }

    /// Run-scoped scratch area for intermediate artifacts.
    pub fn scratch_dir(&self) -> PathBuf {
        self.output_dir().join("tmp")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.output_dir().join("thumbnail.png")
    }

    pub fn final_video_path(&self) -> PathBuf {
        self.output_dir().join("final_video.mp4")
    }

    /// Rejects values the pipeline cannot run with. Values that merely
    /// degrade output (a missing font file, an unreachable backend) are
    /// handled downstream and intentionally pass here.
    fn validate(&self) -> Result<()> {
        if self.paths.output_dir.trim().is_empty() {
            return Err(ConfigError::Invalid {
                section: "paths",
                reason: "output_dir is empty".into(),
            });
        }
        if self.font.step <= 0.0 {
            return Err(ConfigError::Invalid {
                section: "font",
                reason: format!("step must be positive, got {}", self.font.step),
            });
        }
        if self.font.min_size > self.font.base_size {
            return Err(ConfigError::Invalid {
                section: "font",
                reason: format!(
                    "min_size {} exceeds base_size {}",
                    self.font.min_size, self.font.base_size
                ),
            });
        }
        if self.speech.speed_factor <= 0.0 {
            return Err(ConfigError::Invalid {
                section: "speech",
                reason: format!(
                    "speed_factor must be positive, got {}",
                    self.speech.speed_factor
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FontSection {
    pub file: String,
    pub fallback_file: String,
    pub base_size: f32,
    pub min_size: f32,
    pub step: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    pub name: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSection {
    pub locale: String,
    pub speed_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSection {
    pub audio_bitrate: String,
    pub ffmpeg_binary: String,
    pub process_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<NewsreelConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        source,
        path: path.to_path_buf(),
    })?;
    let config: NewsreelConfig =
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            source,
            path: path.to_path_buf(),
        })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/newsreel.toml");
        let config = load_config(path).expect("config should parse");
        assert_eq!(config.model.name, "gpt-4o-mini");
        assert_eq!(config.speech.locale, "ko");
        assert!((config.speech.speed_factor - 1.25).abs() < f64::EPSILON);
        assert_eq!(config.video.audio_bitrate, "192k");
        assert_eq!(config.scratch_dir(), config.output_dir().join("tmp"));
    }

    #[test]
    fn missing_config_reports_path() {
        let err = load_config("does/not/exist.toml").unwrap_err();
        match err {
            ConfigError::Read { path, .. } => {
                assert!(path.ends_with("exist.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nonpositive_speed_factor_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("newsreel.toml");
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/newsreel.toml");
        let content = std::fs::read_to_string(fixture)
            .unwrap()
            .replace("speed_factor = 1.25", "speed_factor = 0.0");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let err = load_config(&path).unwrap_err();
        match err {
            ConfigError::Invalid { section, reason } => {
                assert_eq!(section, "speech");
                assert!(reason.contains("speed_factor"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn inverted_font_bounds_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("newsreel.toml");
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/newsreel.toml");
        let content = std::fs::read_to_string(fixture)
            .unwrap()
            .replace("min_size = 20.0", "min_size = 90.0");
        std::fs::write(&path, content).unwrap();

        let err = load_config(&path).unwrap_err();
        match err {
            ConfigError::Invalid { section, .. } => assert_eq!(section, "font"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
