//! Stage implementations.
//!
//! Each stage assembles its inputs from the prior stages' payloads, invokes
//! the matching generation capability, persists outputs through the
//! AssetManager and the object store, and returns its typed payload plus the
//! cost charged. Collaborator errors are translated into the pipeline
//! taxonomy here, once, and never re-wrapped above.

use serde_json::json;
use tracing::debug;

use adreel_assets::{AssetManager, Subdir};
use adreel_generate::{GenerateError, GenerationKind, GenerationRequest};
use adreel_models::payload::{completed_stage, from_stage, to_payload};
use adreel_models::{
    ComposeOutput, Job, PipelineError, PipelineResult, ScriptOutput, Stage, StageName, VideoOutput,
    VoiceOutput,
};
use adreel_storage::StorageError;

use crate::compose::ComposeInputs;
use crate::keys;
use crate::processor::ProcessingContext;

/// Minimum plausible sizes; anything smaller is a truncated generation.
const MIN_AUDIO_BYTES: u64 = 1024;
const MIN_CLIP_BYTES: u64 = 1024;
const MIN_IMAGE_BYTES: u64 = 256;
const MIN_VIDEO_BYTES: u64 = 1024;

/// Output of one stage execution.
pub struct StageOutput {
    /// Payload stored on the Stage record
    pub payload: serde_json::Value,
    /// Cost charged by the generators during this stage
    pub cost: f64,
}

/// Local subdirectory a stage writes into, used to discard partial outputs
/// before a re-run.
pub fn stage_subdir(name: StageName) -> Option<Subdir> {
    match name {
        StageName::ScriptGen => None,
        StageName::VoiceGen => Some(Subdir::Audio),
        StageName::VideoGen => Some(Subdir::Scenes),
        StageName::Compositing => Some(Subdir::Final),
    }
}

/// Run one stage of a job.
///
/// `stages` is the canonical list (used to read prior payloads); `stage` is
/// the one being executed. Scene-level progress is reported through the
/// processor callback on the context.
pub async fn run_stage(
    ctx: &ProcessingContext,
    job: &Job,
    stages: &[Stage],
    stage: &Stage,
    assets: &AssetManager,
) -> PipelineResult<StageOutput> {
    match stage.name {
        StageName::ScriptGen => script_gen(ctx, job, assets).await,
        StageName::VoiceGen => voice_gen(ctx, job, stages, assets).await,
        StageName::VideoGen => video_gen(ctx, job, stages, stage, assets).await,
        StageName::Compositing => compositing(ctx, job, stages, assets).await,
    }
}

async fn script_gen(
    ctx: &ProcessingContext,
    job: &Job,
    assets: &AssetManager,
) -> PipelineResult<StageOutput> {
    let request = GenerationRequest::new(
        GenerationKind::Script,
        json!({
            "product_name": job.brief.product_name,
            "style": job.brief.style,
            "cta_text": job.brief.cta_text,
            "source_image": job.brief.source_image,
        }),
    );

    let asset = ctx
        .generator
        .generate(&request)
        .await
        .map_err(|e| from_generate(e, StageName::ScriptGen))?;

    let script: ScriptOutput = serde_json::from_slice(&asset.bytes).map_err(|e| {
        PipelineError::external_service(format!("script response is malformed: {e}"))
            .permanent()
            .in_stage(StageName::ScriptGen)
    })?;

    if script.scene_prompts.is_empty() {
        return Err(
            PipelineError::external_service("script contains no scene prompts")
                .permanent()
                .in_stage(StageName::ScriptGen),
        );
    }

    assets.save_file(&asset.bytes, "script.json", None).await?;

    debug!(job_id = %job.id, scenes = script.scene_prompts.len(), "Script generated");
    Ok(StageOutput {
        payload: to_payload(&script)?,
        cost: asset.cost,
    })
}

async fn voice_gen(
    ctx: &ProcessingContext,
    job: &Job,
    stages: &[Stage],
    assets: &AssetManager,
) -> PipelineResult<StageOutput> {
    let script: ScriptOutput = from_stage(completed_stage(stages, StageName::ScriptGen)?)?;

    if script.voiceover_text.trim().is_empty() {
        return Err(PipelineError::validation("voiceover text is empty")
            .in_stage(StageName::VoiceGen));
    }

    let request = GenerationRequest::new(
        GenerationKind::Voiceover,
        json!({
            "text": script.voiceover_text,
            "style": job.brief.style,
        }),
    );

    let asset = ctx
        .generator
        .generate(&request)
        .await
        .map_err(|e| from_generate(e, StageName::VoiceGen))?;

    let filename = "voiceover.mp3";
    let local_path = assets
        .save_file(&asset.bytes, filename, Some(Subdir::Audio))
        .await?;

    if !assets
        .validate_file(filename, Some(Subdir::Audio), MIN_AUDIO_BYTES)
        .await?
    {
        return Err(
            PipelineError::external_service("voiceover audio is truncated")
                .in_stage(StageName::VoiceGen),
        );
    }

    let audio_key = keys::voiceover_key(&job.id);
    ctx.store
        .upload_file(&local_path, &audio_key, &asset.content_type)
        .await
        .map_err(|e| from_storage(e, StageName::VoiceGen))?;

    Ok(StageOutput {
        payload: to_payload(&VoiceOutput {
            audio_key,
            duration_secs: None,
        })?,
        cost: asset.cost,
    })
}

async fn video_gen(
    ctx: &ProcessingContext,
    job: &Job,
    stages: &[Stage],
    stage: &Stage,
    assets: &AssetManager,
) -> PipelineResult<StageOutput> {
    let script: ScriptOutput = from_stage(completed_stage(stages, StageName::ScriptGen)?)?;

    let total = script.scene_prompts.len();
    let mut scene_keys = Vec::with_capacity(total);
    let mut cost = 0.0;

    for (i, prompt) in script.scene_prompts.iter().enumerate() {
        let request = GenerationRequest::new(
            GenerationKind::SceneClip,
            json!({
                "prompt": prompt,
                "style": job.brief.style,
                "product_name": job.brief.product_name,
                "aspect_ratio": "9:16",
            }),
        );

        let asset = ctx
            .generator
            .generate(&request)
            .await
            .map_err(|e| from_generate(e, StageName::VideoGen))?;

        let filename = format!("scene_{i}.mp4");
        let local_path = assets
            .save_file(&asset.bytes, &filename, Some(Subdir::Scenes))
            .await?;

        if !assets
            .validate_file(&filename, Some(Subdir::Scenes), MIN_CLIP_BYTES)
            .await?
        {
            return Err(PipelineError::external_service(format!(
                "scene clip {i} is truncated"
            ))
            .in_stage(StageName::VideoGen));
        }

        let scene_key = keys::scene_clip_key(&job.id, i);
        ctx.store
            .upload_file(&local_path, &scene_key, &asset.content_type)
            .await
            .map_err(|e| from_storage(e, StageName::VideoGen))?;

        scene_keys.push(scene_key);
        cost += asset.cost;

        let pct = (((i + 1) * 100) / total) as u8;
        ctx.report_stage_progress(job, stage, pct).await;
    }

    Ok(StageOutput {
        payload: to_payload(&VideoOutput { scene_keys })?,
        cost,
    })
}

async fn compositing(
    ctx: &ProcessingContext,
    job: &Job,
    stages: &[Stage],
    assets: &AssetManager,
) -> PipelineResult<StageOutput> {
    let voice: VoiceOutput = from_stage(completed_stage(stages, StageName::VoiceGen)?)?;
    let video: VideoOutput = from_stage(completed_stage(stages, StageName::VideoGen)?)?;

    // CTA image is generated as part of this stage.
    let request = GenerationRequest::new(
        GenerationKind::CtaImage,
        json!({
            "cta_text": job.brief.cta_text,
            "style": job.brief.style,
            "product_name": job.brief.product_name,
        }),
    );
    let cta = ctx
        .generator
        .generate(&request)
        .await
        .map_err(|e| from_generate(e, StageName::Compositing))?;

    let cta_filename = "cta.png";
    let cta_path = assets
        .save_file(&cta.bytes, cta_filename, Some(Subdir::Final))
        .await?;
    if !assets
        .validate_file(cta_filename, Some(Subdir::Final), MIN_IMAGE_BYTES)
        .await?
    {
        return Err(PipelineError::external_service("CTA image is truncated")
            .in_stage(StageName::Compositing));
    }

    let cta_image_key = keys::cta_image_key(&job.id);
    ctx.store
        .upload_file(&cta_path, &cta_image_key, &cta.content_type)
        .await
        .map_err(|e| from_storage(e, StageName::Compositing))?;

    // Prior stages persisted their outputs remotely; pull them through the
    // local cache so retries within the window do not re-download.
    let mut scene_paths = Vec::with_capacity(video.scene_keys.len());
    for key in &video.scene_keys {
        let path = ctx
            .cache
            .get_file(key)
            .await
            .map_err(|e| from_storage(e, StageName::Compositing))?;
        scene_paths.push(path);
    }
    let audio_path = ctx
        .cache
        .get_file(&voice.audio_key)
        .await
        .map_err(|e| from_storage(e, StageName::Compositing))?;

    let output_filename = "ad.mp4";
    let output_path = assets.get_path(output_filename, Some(Subdir::Final))?;
    ctx.composer
        .compose(
            &ComposeInputs {
                scene_paths,
                audio_path,
                cta_image_path: cta_path,
            },
            &output_path,
        )
        .await?;

    if !assets
        .validate_file(output_filename, Some(Subdir::Final), MIN_VIDEO_BYTES)
        .await?
    {
        return Err(PipelineError::external_service("composed video is truncated")
            .in_stage(StageName::Compositing));
    }

    let video_key = keys::final_video_key(&job.id);
    ctx.store
        .upload_file(&output_path, &video_key, "video/mp4")
        .await
        .map_err(|e| from_storage(e, StageName::Compositing))?;

    Ok(StageOutput {
        payload: to_payload(&ComposeOutput {
            video_key,
            cta_image_key,
        })?,
        cost: cta.cost,
    })
}

/// Translate a generation-client failure into the pipeline taxonomy.
fn from_generate(e: GenerateError, stage: StageName) -> PipelineError {
    if e.is_timeout() {
        return PipelineError::timeout(e.to_string()).in_stage(stage);
    }

    let mut err = PipelineError::external_service(e.to_string());
    if let Some(status) = e.status() {
        err = err.with_status(status);
    }
    if e.is_permanent() {
        err = err.permanent();
    }
    err.in_stage(stage)
}

/// Translate a storage failure into the pipeline taxonomy.
fn from_storage(e: StorageError, stage: StageName) -> PipelineError {
    match e {
        StorageError::Io(io) => {
            let transient = matches!(
                io.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            );
            PipelineError::file_system(io.to_string(), transient).in_stage(stage)
        }
        StorageError::NotFound(_) => {
            // A missing prior-stage object will not appear by retrying.
            PipelineError::external_service(e.to_string())
                .permanent()
                .in_stage(stage)
        }
        other => PipelineError::external_service(other.to_string()).in_stage(stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::ErrorKind;

    #[test]
    fn test_stage_subdir_mapping() {
        assert_eq!(stage_subdir(StageName::ScriptGen), None);
        assert_eq!(stage_subdir(StageName::VoiceGen), Some(Subdir::Audio));
        assert_eq!(stage_subdir(StageName::VideoGen), Some(Subdir::Scenes));
        assert_eq!(stage_subdir(StageName::Compositing), Some(Subdir::Final));
    }

    #[test]
    fn test_generate_translation_preserves_retry_semantics() {
        let e = from_generate(GenerateError::api(503, "overloaded"), StageName::VideoGen);
        assert_eq!(e.kind, ErrorKind::ExternalService);
        assert!(e.should_retry());

        let e = from_generate(
            GenerateError::policy_refusal(422, "rejected"),
            StageName::ScriptGen,
        );
        assert!(!e.should_retry());

        let e = from_generate(
            GenerateError::Timeout("slow".to_string()),
            StageName::VoiceGen,
        );
        assert_eq!(e.kind, ErrorKind::Timeout);
        assert!(e.should_retry());
    }

    #[test]
    fn test_storage_translation() {
        let e = from_storage(StorageError::not_found("ads/j/x"), StageName::Compositing);
        assert!(!e.should_retry());

        let e = from_storage(
            StorageError::upload_failed("connection reset"),
            StageName::VoiceGen,
        );
        assert!(e.should_retry());
    }
}
