//! Generation request/response types and the capability trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GenerateResult;

/// The closed set of generation capabilities.
///
/// Backend selection happens through this enum and the client's endpoint
/// table; there is no name-based dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// Ad script + scene prompts (LLM)
    Script,
    /// Voiceover audio (TTS)
    Voiceover,
    /// One video clip for one scene prompt
    SceneClip,
    /// Call-to-action image
    CtaImage,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Script => "script",
            GenerationKind::Voiceover => "voiceover",
            GenerationKind::SceneClip => "scene_clip",
            GenerationKind::CtaImage => "cta_image",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generation request: a kind plus structured, kind-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: GenerationKind,
    pub params: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(kind: GenerationKind, params: serde_json::Value) -> Self {
        Self { kind, params }
    }
}

/// One generated asset: opaque bytes plus bookkeeping.
#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    /// Payload to persist (video/audio/image bytes, or UTF-8 JSON for script)
    pub bytes: Vec<u8>,
    /// MIME type reported by the backend
    pub content_type: String,
    /// Cost charged for this generation, in account units
    pub cost: f64,
}

/// The uniform generation capability consumed by the pipeline.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation and return the produced asset.
    async fn generate(&self, request: &GenerationRequest) -> GenerateResult<GeneratedAsset>;

    /// Whether the backing service is reachable.
    async fn health_check(&self) -> bool;
}
