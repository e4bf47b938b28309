use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

/// Run-scoped temporary directory holding every intermediate artifact.
///
/// The area is purged unconditionally at the start and the end of a
/// pipeline run so no stale artifact leaks between runs. All paths use
/// scene-id-keyed filenames; the image cache and fallback logic rely on
/// that keying staying stable within a run.
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes the whole area and recreates it empty. Best effort: a
    /// failed removal is logged and the recreate still attempted, so a
    /// half-broken scratch never aborts a run.
    pub async fn purge(&self) {
        if fs::metadata(&self.root).await.is_ok() {
            if let Err(err) = fs::remove_dir_all(&self.root).await {
                warn!(path = %self.root.display(), error = %err, "failed to purge scratch area");
            }
        }
        if let Err(err) = fs::create_dir_all(&self.root).await {
            warn!(path = %self.root.display(), error = %err, "failed to recreate scratch area");
        }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn scenario_json(&self) -> PathBuf {
        self.path("scenario.json")
    }

    pub fn scene_image(&self, scene_id: u32) -> PathBuf {
        self.path(&format!("scene_{scene_id}.png"))
    }

    pub fn scene_overlay(&self, scene_id: u32) -> PathBuf {
        self.path(&format!("scene_{scene_id}_overlay.png"))
    }

    pub fn scene_audio(&self, scene_id: u32) -> PathBuf {
        self.path(&format!("scene_{scene_id}_fast.mp3"))
    }

    pub fn scene_clip(&self, scene_id: u32) -> PathBuf {
        self.path(&format!("scene_{scene_id}.mp4"))
    }

    pub fn thumbnail_overlay(&self) -> PathBuf {
        self.path("thumbnail_overlay.png")
    }

    pub fn concat_manifest(&self) -> PathBuf {
        self.path("concat_list.txt")
    }

    /// True when the area holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        match fs::read_dir(&self.root).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
            Err(_) => true,
        }
    }
}
