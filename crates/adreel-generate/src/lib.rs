//! Uniform client for the AI generation backends.
//!
//! Every generation capability (script, voiceover, scene clips, CTA images)
//! sits behind the [`Generator`] trait; the HTTP implementation routes each
//! [`GenerationKind`] to its configured endpoint. The pipeline treats all
//! returned payloads as opaque bytes to persist.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GeneratorConfig, HttpGenerator};
pub use error::{GenerateError, GenerateResult};
pub use types::{GeneratedAsset, GenerationKind, GenerationRequest, Generator};
