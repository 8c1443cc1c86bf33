//! Final video composition.
//!
//! Concatenates the scene clips, lays the voiceover under them, and holds the
//! CTA image over the tail. Runs behind a trait so the pipeline can be
//! exercised without media tooling.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use adreel_models::{PipelineError, PipelineResult};

/// Inputs to composition, all local paths.
#[derive(Debug, Clone)]
pub struct ComposeInputs {
    /// Scene clips in presentation order
    pub scene_paths: Vec<PathBuf>,
    /// Voiceover audio
    pub audio_path: PathBuf,
    /// CTA image
    pub cta_image_path: PathBuf,
}

/// Composes the final vertical video from stage outputs.
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, inputs: &ComposeInputs, output: &Path) -> PipelineResult<()>;
}

/// FFmpeg-based composer.
pub struct FfmpegComposer;

#[async_trait]
impl Composer for FfmpegComposer {
    async fn compose(&self, inputs: &ComposeInputs, output: &Path) -> PipelineResult<()> {
        use tokio::process::Command;

        if inputs.scene_paths.is_empty() {
            return Err(PipelineError::validation("no scene clips to compose"));
        }

        info!(
            scenes = inputs.scene_paths.len(),
            output = %output.display(),
            "Composing final video"
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);

        for scene in &inputs.scene_paths {
            cmd.arg("-i").arg(scene);
        }
        cmd.arg("-i").arg(&inputs.audio_path);
        cmd.arg("-i").arg(&inputs.cta_image_path);

        // Scale every scene to 1080x1920, concatenate, then pin the CTA
        // image over the lower third of the concatenated video.
        let n = inputs.scene_paths.len();
        let audio_idx = n;
        let image_idx = n + 1;

        let mut filter = String::new();
        for i in 0..n {
            filter.push_str(&format!(
                "[{i}:v]scale=1080:1920:force_original_aspect_ratio=decrease,\
                 pad=1080:1920:(ow-iw)/2:(oh-ih)/2,setsar=1[v{i}];"
            ));
        }
        for i in 0..n {
            filter.push_str(&format!("[v{i}]"));
        }
        filter.push_str(&format!("concat=n={n}:v=1:a=0[cat];"));
        filter.push_str(&format!(
            "[{image_idx}:v]scale=800:-1[cta];[cat][cta]overlay=(W-w)/2:H-h-160[outv]"
        ));

        let output_status = cmd
            .arg("-filter_complex")
            .arg(&filter)
            .args(["-map", "[outv]", "-map"])
            .arg(format!("{audio_idx}:a"))
            .args(["-c:v", "libx264", "-preset", "medium", "-crf", "20"])
            .args(["-c:a", "aac", "-shortest"])
            .args(["-movflags", "+faststart"])
            .arg(output)
            .output()
            .await
            .map_err(|e| PipelineError::file_system(format!("failed to run ffmpeg: {e}"), false))?;

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            // Same inputs would fail the same way; do not retry.
            return Err(PipelineError::external_service(format!(
                "ffmpeg composition failed: {stderr}"
            ))
            .permanent());
        }

        let metadata = tokio::fs::metadata(output).await.map_err(|e| {
            PipelineError::file_system(format!("composed output missing: {e}"), false)
        })?;
        if metadata.len() == 0 {
            return Err(
                PipelineError::external_service("ffmpeg produced an empty output").permanent()
            );
        }

        info!(output = %output.display(), bytes = metadata.len(), "Composition complete");
        Ok(())
    }
}
