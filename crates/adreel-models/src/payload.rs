//! Typed stage payloads.
//!
//! Each stage stores its output on the Stage record as opaque JSON; these are
//! the concrete shapes, with helpers to move between them and the stored
//! value. The next stage in the pipeline reads its inputs from the previous
//! stage's payload.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{Stage, StageName};

/// Output of `script_gen`: the ad script and downstream prompts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScriptOutput {
    /// Full ad script
    pub script: String,
    /// Text read by the voiceover stage
    pub voiceover_text: String,
    /// One prompt per video scene, in presentation order
    pub scene_prompts: Vec<String>,
}

/// Output of `voice_gen`: the persisted voiceover audio.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VoiceOutput {
    /// Remote object key of the voiceover audio
    pub audio_key: String,
    /// Duration in seconds, when reported by the generator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Output of `video_gen`: the persisted scene clips.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoOutput {
    /// Remote object keys of the scene clips, in presentation order
    pub scene_keys: Vec<String>,
}

/// Output of `compositing`: the final video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComposeOutput {
    /// Remote object key of the composed video
    pub video_key: String,
    /// Remote object key of the generated CTA image
    pub cta_image_key: String,
}

/// Serialize a typed payload for storage on a Stage record.
pub fn to_payload<T: Serialize>(value: &T) -> PipelineResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| PipelineError::validation(format!("failed to encode stage payload: {e}")))
}

/// Read a prior stage's payload as its typed shape.
///
/// A missing or malformed payload means the pipeline invariant was broken
/// upstream; surfaced as a validation error naming the stage.
pub fn from_stage<T: DeserializeOwned>(stage: &Stage) -> PipelineResult<T> {
    let payload = stage.payload.as_ref().ok_or_else(|| {
        PipelineError::validation(format!("stage {} has no payload", stage.name)).in_stage(stage.name)
    })?;
    serde_json::from_value(payload.clone()).map_err(|e| {
        PipelineError::validation(format!("stage {} payload is malformed: {e}", stage.name))
            .in_stage(stage.name)
    })
}

/// Find a completed stage by name in a job's stage list.
pub fn completed_stage<'a>(stages: &'a [Stage], name: StageName) -> PipelineResult<&'a Stage> {
    stages
        .iter()
        .find(|s| s.name == name && s.status == crate::stage::StageStatus::Completed)
        .ok_or_else(|| {
            PipelineError::validation(format!("required stage {name} has not completed"))
                .in_stage(name)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    #[test]
    fn test_payload_roundtrip_through_stage() {
        let output = ScriptOutput {
            script: "Meet the Solar Kettle.".to_string(),
            voiceover_text: "Meet the Solar Kettle.".to_string(),
            scene_prompts: vec!["kettle on a sunlit table".to_string()],
        };
        let stage = Stage::new(JobId::new(), StageName::ScriptGen)
            .start()
            .complete(to_payload(&output).unwrap());

        let read: ScriptOutput = from_stage(&stage).unwrap();
        assert_eq!(read.scene_prompts.len(), 1);
    }

    #[test]
    fn test_missing_payload_is_a_validation_error() {
        let stage = Stage::new(JobId::new(), StageName::VoiceGen);
        let err = from_stage::<VoiceOutput>(&stage).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }
}
