use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::process::{run_bounded, CommandExecutor};

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("encoder exited with {code:?}: {stderr}")]
    Encoder { code: Option<i32>, stderr: String },
    #[error("no clips to concatenate")]
    Empty,
}

pub type ClipResult<T> = Result<T, ClipError>;

/// Renders one still image plus one narration track into a video clip.
/// The image is looped for the duration of the audio; odd pixel
/// dimensions are trimmed so the yuv420p conversion cannot reject the
/// frame.
pub struct ClipAssembler {
    executor: Arc<dyn CommandExecutor>,
    ffmpeg: PathBuf,
    audio_bitrate: String,
    process_timeout: Duration,
}

impl ClipAssembler {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        ffmpeg: PathBuf,
        audio_bitrate: impl Into<String>,
        process_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            ffmpeg,
            audio_bitrate: audio_bitrate.into(),
            process_timeout,
        }
    }

    pub async fn assemble(&self, image: &Path, audio: &Path, dest: &Path) -> Option<PathBuf> {
        match self.encode(image, audio, dest).await {
            Ok(()) => {
                info!(path = %dest.display(), "clip assembled");
                Some(dest.to_path_buf())
            }
            Err(err) => {
                error!(path = %dest.display(), error = %err, "clip assembly failed");
                None
            }
        }
    }

    async fn encode(&self, image: &Path, audio: &Path, dest: &Path) -> ClipResult<()> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-loop")
            .arg("1")
            .arg("-i")
            .arg(image)
            .arg("-i")
            .arg(audio)
            .arg("-map")
            .arg("0:v:0")
            .arg("-map")
            .arg("1:a:0")
            .arg("-c:v")
            .arg("libx264")
            .arg("-tune")
            .arg("stillimage")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg(&self.audio_bitrate)
            .arg("-vf")
            .arg("scale='iw-mod(iw,2)':'ih-mod(ih,2)',format=yuv420p")
            .arg("-shortest")
            .arg("-movflags")
            .arg("+faststart")
            .arg(dest);
        let output = run_bounded(self.executor.as_ref(), &mut command, self.process_timeout)
            .await
            .map_err(|source| ClipError::Io {
                source,
                path: dest.to_path_buf(),
            })?;
        if !output.status.success() {
            return Err(ClipError::Encoder {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

/// Joins finished clips losslessly on the video stream via the concat
/// demuxer; audio is re-muxed as aac so mixed clip encodings still
/// concatenate.
pub struct ClipConcatenator {
    executor: Arc<dyn CommandExecutor>,
    ffmpeg: PathBuf,
    process_timeout: Duration,
}

impl ClipConcatenator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        ffmpeg: PathBuf,
        process_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            ffmpeg,
            process_timeout,
        }
    }

    pub async fn concatenate(
        &self,
        clips: &[PathBuf],
        manifest: &Path,
        dest: &Path,
    ) -> Option<PathBuf> {
        if clips.is_empty() {
            warn!("nothing to concatenate");
            return None;
        }
        let result = self.join(clips, manifest, dest).await;
        if let Err(err) = tokio::fs::remove_file(manifest).await {
            warn!(path = %manifest.display(), error = %err, "manifest cleanup failed");
        }
        match result {
            Ok(()) => {
                info!(path = %dest.display(), clips = clips.len(), "final video concatenated");
                Some(dest.to_path_buf())
            }
            Err(err) => {
                error!(path = %dest.display(), error = %err, "concatenation failed");
                None
            }
        }
    }

    async fn join(&self, clips: &[PathBuf], manifest: &Path, dest: &Path) -> ClipResult<()> {
        let mut listing = String::new();
        for clip in clips {
            let absolute = std::path::absolute(clip).map_err(|source| ClipError::Io {
                source,
                path: clip.clone(),
            })?;
            listing.push_str(&format!("file '{}'\n", absolute.display()));
        }
        tokio::fs::write(manifest, listing)
            .await
            .map_err(|source| ClipError::Io {
                source,
                path: manifest.to_path_buf(),
            })?;

        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(manifest)
            .arg("-c:v")
            .arg("copy")
            .arg("-c:a")
            .arg("aac")
            .arg(dest);
        let output = run_bounded(self.executor.as_ref(), &mut command, self.process_timeout)
            .await
            .map_err(|source| ClipError::Io {
                source,
                path: dest.to_path_buf(),
            })?;
        if !output.status.success() {
            return Err(ClipError::Encoder {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubExecutor {
        succeed: bool,
        seen: Mutex<Vec<String>>,
        manifest_snapshot: Mutex<Option<String>>,
    }

    impl StubExecutor {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                succeed,
                seen: Mutex::new(Vec::new()),
                manifest_snapshot: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for StubExecutor {
        async fn run(&self, command: &mut Command) -> std::io::Result<std::process::Output> {
            let args: Vec<String> = command
                .as_std()
                .get_args()
                .map(|arg| arg.to_string_lossy().to_string())
                .collect();
            // Capture the manifest body before the concatenator deletes it.
            if let Some(index) = args.iter().position(|arg| arg == "-i") {
                if let Ok(body) = std::fs::read_to_string(&args[index + 1]) {
                    *self.manifest_snapshot.lock().unwrap() = Some(body);
                }
            }
            *self.seen.lock().unwrap() = args;
            let program = if self.succeed { "true" } else { "false" };
            Command::new(program).output().await
        }
    }

    #[tokio::test]
    async fn assemble_builds_still_image_encode() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("scene_1.mp4");
        let executor = StubExecutor::new(true);
        let assembler = ClipAssembler::new(
            executor.clone(),
            PathBuf::from("ffmpeg"),
            "192k",
            Duration::from_secs(5),
        );

        let produced = assembler
            .assemble(Path::new("scene_1_overlay.png"), Path::new("scene_1_fast.mp3"), &dest)
            .await;

        assert_eq!(produced, Some(dest.clone()));
        let args = executor.seen.lock().unwrap().clone();
        assert!(args.windows(2).any(|w| w == ["-loop", "1"]));
        assert!(args.windows(2).any(|w| w == ["-tune", "stillimage"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "192k"]));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args
            .contains(&"scale='iw-mod(iw,2)':'ih-mod(ih,2)',format=yuv420p".to_string()));
    }

    #[tokio::test]
    async fn assemble_failure_yields_none() {
        let tmp = TempDir::new().unwrap();
        let assembler = ClipAssembler::new(
            StubExecutor::new(false),
            PathBuf::from("ffmpeg"),
            "192k",
            Duration::from_secs(5),
        );
        let produced = assembler
            .assemble(
                Path::new("img.png"),
                Path::new("audio.mp3"),
                &tmp.path().join("out.mp4"),
            )
            .await;
        assert!(produced.is_none());
    }

    #[tokio::test]
    async fn concatenate_writes_ordered_manifest_and_cleans_it_up() {
        let tmp = TempDir::new().unwrap();
        let clips = vec![
            tmp.path().join("scene_1.mp4"),
            tmp.path().join("scene_2.mp4"),
            tmp.path().join("scene_4.mp4"),
        ];
        let manifest = tmp.path().join("concat.txt");
        let dest = tmp.path().join("final_video.mp4");
        let executor = StubExecutor::new(true);
        let concatenator = ClipConcatenator::new(
            executor.clone(),
            PathBuf::from("ffmpeg"),
            Duration::from_secs(5),
        );

        let produced = concatenator.concatenate(&clips, &manifest, &dest).await;

        assert_eq!(produced, Some(dest));
        assert!(!manifest.exists());
        let body = executor.manifest_snapshot.lock().unwrap().clone().unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("scene_1.mp4"));
        assert!(lines[1].contains("scene_2.mp4"));
        assert!(lines[2].contains("scene_4.mp4"));
        assert!(lines.iter().all(|line| line.starts_with("file '")));

        let args = executor.seen.lock().unwrap().clone();
        assert!(args.windows(2).any(|w| w == ["-f", "concat"]));
        assert!(args.windows(2).any(|w| w == ["-safe", "0"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
    }

    #[tokio::test]
    async fn concatenate_empty_input_yields_none_without_manifest() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("concat.txt");
        let concatenator = ClipConcatenator::new(
            StubExecutor::new(true),
            PathBuf::from("ffmpeg"),
            Duration::from_secs(5),
        );
        let produced = concatenator
            .concatenate(&[], &manifest, &tmp.path().join("final_video.mp4"))
            .await;
        assert!(produced.is_none());
        assert!(!manifest.exists());
    }

    #[tokio::test]
    async fn concatenate_failure_still_removes_manifest() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join("concat.txt");
        let concatenator = ClipConcatenator::new(
            StubExecutor::new(false),
            PathBuf::from("ffmpeg"),
            Duration::from_secs(5),
        );
        let produced = concatenator
            .concatenate(
                &[tmp.path().join("scene_1.mp4")],
                &manifest,
                &tmp.path().join("final_video.mp4"),
            )
            .await;
        assert!(produced.is_none());
        assert!(!manifest.exists());
    }
}
