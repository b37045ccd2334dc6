pub mod gemini;

pub use gemini::GeminiVision;

use crate::models::{ListingDraft, RawImage};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("vision credential is not configured")]
    MissingCredential,
    #[error("vision request failed: {0}")]
    Transport(String),
    #[error("vision endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model output is not a single JSON object: {0}")]
    Malformed(String),
    #[error("extracted draft failed validation: {0}")]
    Invalid(String),
}

/// Turns one product photo into a structured listing draft. Implementations
/// must return a fully valid draft or fail; partially populated records
/// never cross this boundary.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, image: &RawImage) -> Result<ListingDraft, ExtractionError>;
}
