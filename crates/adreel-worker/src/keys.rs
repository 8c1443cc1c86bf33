//! Remote object key layout.
//!
//! Keys mirror the per-job asset tree 1:1 under `ads/{job_id}/`, which is
//! also the layout the object cache reproduces locally.

use adreel_models::JobId;

/// Key for the voiceover audio.
pub fn voiceover_key(job_id: &JobId) -> String {
    format!("ads/{}/audio/voiceover.mp3", job_id)
}

/// Key for one scene clip.
pub fn scene_clip_key(job_id: &JobId, scene_index: usize) -> String {
    format!("ads/{}/scenes/scene_{}.mp4", job_id, scene_index)
}

/// Key for the CTA image.
pub fn cta_image_key(job_id: &JobId) -> String {
    format!("ads/{}/final/cta.png", job_id)
}

/// Key for the final composed video.
pub fn final_video_key(job_id: &JobId) -> String {
    format!("ads/{}/final/ad.mp4", job_id)
}
