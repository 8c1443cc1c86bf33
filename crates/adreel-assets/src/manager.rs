//! Job-scoped asset manager.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use adreel_models::{JobId, PipelineError, PipelineResult};

/// Named subdirectories of a job's asset tree.
///
/// The closed set keeps path construction away from caller-supplied strings;
/// only filenames are accepted from outside, and those are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Subdir {
    /// Generated scene clips
    Scenes,
    /// Voiceover audio
    Audio,
    /// Composed output and CTA image
    Final,
}

impl Subdir {
    pub const ALL: [Subdir; 3] = [Subdir::Scenes, Subdir::Audio, Subdir::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subdir::Scenes => "scenes",
            Subdir::Audio => "audio",
            Subdir::Final => "final",
        }
    }
}

/// A file present in a job's asset tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// Isolated, structured working directory for one job.
#[derive(Debug, Clone)]
pub struct AssetManager {
    job_id: JobId,
    root: PathBuf,
}

impl AssetManager {
    /// Create a manager scoped to `work_root/{job_id}`.
    ///
    /// Does not touch the filesystem; call [`create_job_directory`] first
    /// (idempotent) or let the first `save_file` do it.
    ///
    /// [`create_job_directory`]: AssetManager::create_job_directory
    pub fn new(work_root: impl AsRef<Path>, job_id: JobId) -> Self {
        let root = work_root.as_ref().join(job_id.as_str());
        Self { job_id, root }
    }

    /// The job this manager is scoped to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Root of the job's subtree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and all named subdirectories. No error if they exist.
    pub async fn create_job_directory(&self) -> PipelineResult<()> {
        for subdir in Subdir::ALL {
            let dir = self.root.join(subdir.as_str());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| fs_error("create job directory", &dir, &e))?;
        }
        debug!(job_id = %self.job_id, root = %self.root.display(), "Created job directory");
        Ok(())
    }

    /// Write `content` under the root (or the named subdirectory) and return
    /// the absolute path written.
    pub async fn save_file(
        &self,
        content: &[u8],
        filename: &str,
        subdir: Option<Subdir>,
    ) -> PipelineResult<PathBuf> {
        let path = self.get_path(filename, subdir)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fs_error("create asset directory", parent, &e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| fs_error("write asset", &path, &e))?;

        debug!(
            job_id = %self.job_id,
            path = %path.display(),
            bytes = content.len(),
            "Saved asset"
        );
        Ok(path)
    }

    /// List files (name + size) in the root or a subdirectory.
    ///
    /// Returns an empty list when the directory does not exist. Ordering is
    /// whatever the filesystem yields.
    pub async fn list_files(&self, subdir: Option<Subdir>) -> PipelineResult<Vec<FileEntry>> {
        let dir = match subdir {
            Some(s) => self.root.join(s.as_str()),
            None => self.root.clone(),
        };

        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(fs_error("list assets", &dir, &e)),
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| fs_error("list assets", &dir, &e))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| fs_error("stat asset", &entry.path(), &e))?;
            if meta.is_file() {
                entries.push(FileEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: meta.len(),
                });
            }
        }
        Ok(entries)
    }

    /// True iff the file exists and is at least `min_size` bytes.
    ///
    /// Used to catch truncated or empty generation outputs before they are
    /// persisted downstream.
    pub async fn validate_file(
        &self,
        filename: &str,
        subdir: Option<Subdir>,
        min_size: u64,
    ) -> PipelineResult<bool> {
        let path = self.get_path(filename, subdir)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file() && meta.len() >= min_size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(fs_error("stat asset", &path, &e)),
        }
    }

    /// Resolve the path a write for `filename` would use, without requiring
    /// the file (or its directory) to exist.
    ///
    /// This is the single validation boundary for caller-supplied filenames.
    pub fn get_path(&self, filename: &str, subdir: Option<Subdir>) -> PipelineResult<PathBuf> {
        validate_filename(filename)?;
        let base = match subdir {
            Some(s) => self.root.join(s.as_str()),
            None => self.root.clone(),
        };
        Ok(base.join(filename))
    }

    /// Recursive sum of file sizes under the job's root.
    pub async fn get_disk_usage(&self) -> PipelineResult<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(fs_error("scan assets", &dir, &e)),
            };
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| fs_error("scan assets", &dir, &e))?
            {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| fs_error("stat asset", &entry.path(), &e))?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }

    /// Delete a stage's prior outputs before a retry re-runs it.
    ///
    /// Removes and recreates the subdirectory so a re-run never mixes partial
    /// files from a failed attempt with fresh ones.
    pub async fn discard_subdir(&self, subdir: Subdir) -> PipelineResult<()> {
        let dir = self.root.join(subdir.as_str());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(fs_error("discard assets", &dir, &e)),
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| fs_error("recreate asset directory", &dir, &e))
    }

    /// Recursively remove the whole job tree.
    ///
    /// Idempotent and infallible: errors are logged and suppressed so every
    /// exit path can call it unconditionally.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                debug!(job_id = %self.job_id, "Cleaned up job directory");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    job_id = %self.job_id,
                    root = %self.root.display(),
                    error = %e,
                    "Failed to clean up job directory"
                );
            }
        }
    }
}

/// Reject filenames that could escape the job's subtree.
fn validate_filename(filename: &str) -> PipelineResult<()> {
    if filename.is_empty() {
        return Err(PipelineError::validation("filename must not be empty"));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(PipelineError::validation(format!(
            "filename must not contain path separators: {filename:?}"
        )));
    }
    if filename.contains("..") {
        return Err(PipelineError::validation(format!(
            "filename must not contain parent references: {filename:?}"
        )));
    }
    Ok(())
}

/// Map an I/O failure to the pipeline taxonomy.
///
/// Interrupted and would-block conditions are transient; permission and
/// space exhaustion are not.
fn fs_error(op: &str, path: &Path, e: &std::io::Error) -> PipelineError {
    let transient = matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    );
    PipelineError::file_system(format!("{op} {}: {e}", path.display()), transient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::ErrorKind;

    fn manager(root: &Path) -> AssetManager {
        AssetManager::new(root, JobId::new())
    }

    #[tokio::test]
    async fn test_create_job_directory_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        assets.create_job_directory().await.unwrap();
        assets.create_job_directory().await.unwrap();

        for subdir in Subdir::ALL {
            assert!(assets.root().join(subdir.as_str()).is_dir());
        }
    }

    #[tokio::test]
    async fn test_save_and_list_and_validate() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        let path = assets
            .save_file(b"fake mp4 bytes", "scene_0.mp4", Some(Subdir::Scenes))
            .await
            .unwrap();
        assert!(path.ends_with("scenes/scene_0.mp4"));

        let files = assets.list_files(Some(Subdir::Scenes)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "scene_0.mp4");
        assert_eq!(files[0].size, 14);

        assert!(assets
            .validate_file("scene_0.mp4", Some(Subdir::Scenes), 10)
            .await
            .unwrap());
        assert!(!assets
            .validate_file("scene_0.mp4", Some(Subdir::Scenes), 1000)
            .await
            .unwrap());
        assert!(!assets
            .validate_file("missing.mp4", Some(Subdir::Scenes), 1)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_files_on_absent_subdir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());
        let files = assets.list_files(Some(Subdir::Audio)).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_filenames_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        for bad in ["../escape.mp4", "a/b.mp4", "a\\b.mp4", "..", "x..y", ""] {
            let err = assets.save_file(b"x", bad, None).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_disk_usage_sums_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        assets.save_file(&[0u8; 100], "a.mp4", Some(Subdir::Scenes)).await.unwrap();
        assets.save_file(&[0u8; 50], "b.mp3", Some(Subdir::Audio)).await.unwrap();
        assets.save_file(&[0u8; 25], "meta.json", None).await.unwrap();

        assert_eq!(assets.get_disk_usage().await.unwrap(), 175);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_empties_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        assets.save_file(b"x", "a.mp4", Some(Subdir::Scenes)).await.unwrap();
        assets.cleanup().await;
        assets.cleanup().await;

        for subdir in Subdir::ALL {
            assert!(assets.list_files(Some(subdir)).await.unwrap().is_empty());
        }
        assert!(!assets.root().exists());
    }

    #[tokio::test]
    async fn test_discard_subdir_clears_only_that_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());

        assets.save_file(b"clip", "scene_0.mp4", Some(Subdir::Scenes)).await.unwrap();
        assets.save_file(b"audio", "voiceover.mp3", Some(Subdir::Audio)).await.unwrap();

        assets.discard_subdir(Subdir::Scenes).await.unwrap();

        assert!(assets.list_files(Some(Subdir::Scenes)).await.unwrap().is_empty());
        assert_eq!(assets.list_files(Some(Subdir::Audio)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_path_does_not_require_existence() {
        let tmp = tempfile::tempdir().unwrap();
        let assets = manager(tmp.path());
        let path = assets.get_path("voiceover.mp3", Some(Subdir::Audio)).unwrap();
        assert!(path.ends_with("audio/voiceover.mp3"));
        assert!(!path.exists());
    }
}
