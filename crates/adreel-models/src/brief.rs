//! Ad brief: the validated input parameters of a job.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Upper bounds for intake validation.
const MAX_PRODUCT_NAME_LEN: usize = 200;
const MAX_STYLE_LEN: usize = 100;
const MAX_CTA_LEN: usize = 300;

/// Input parameters for one ad-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdBrief {
    /// Product being advertised
    pub product_name: String,

    /// Visual/tonal style hint passed through to the generators
    pub style: String,

    /// Call-to-action text rendered into the final frames
    pub cta_text: String,

    /// Optional reference to a user-supplied product image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
}

impl AdBrief {
    /// Create a new brief.
    pub fn new(
        product_name: impl Into<String>,
        style: impl Into<String>,
        cta_text: impl Into<String>,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            style: style.into(),
            cta_text: cta_text.into(),
            source_image: None,
        }
    }

    /// Attach a source image reference.
    pub fn with_source_image(mut self, image: impl Into<String>) -> Self {
        self.source_image = Some(image.into());
        self
    }

    /// Validate the brief at intake, before anything is enqueued.
    pub fn validate(&self) -> PipelineResult<()> {
        check_field("product_name", &self.product_name, MAX_PRODUCT_NAME_LEN)?;
        check_field("style", &self.style, MAX_STYLE_LEN)?;
        check_field("cta_text", &self.cta_text, MAX_CTA_LEN)?;
        Ok(())
    }
}

fn check_field(field: &str, value: &str, max_len: usize) -> PipelineResult<()> {
    if value.trim().is_empty() {
        return Err(PipelineError::validation(format!("{field} must not be empty"))
            .with_context("field", field));
    }
    if value.len() > max_len {
        return Err(PipelineError::validation(format!(
            "{field} exceeds the maximum length of {max_len} characters"
        ))
        .with_context("field", field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_valid_brief_passes() {
        let brief = AdBrief::new("Solar Kettle", "energetic", "Order yours today")
            .with_source_image("uploads/kettle.png");
        assert!(brief.validate().is_ok());
    }

    #[test]
    fn test_empty_field_is_rejected() {
        let brief = AdBrief::new("Solar Kettle", "  ", "Order yours today");
        let err = brief.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.context.get("field").map(String::as_str), Some("style"));
    }

    #[test]
    fn test_oversized_field_is_rejected() {
        let brief = AdBrief::new("x".repeat(201), "energetic", "Order yours today");
        let err = brief.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
