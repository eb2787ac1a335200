//! The remote generation seam.
//!
//! The core never talks to a model directly. Adapters implement [`Generator`]
//! and translate their transport failures into [`GenerationError`] so the
//! classifier works on structured data.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Which model a request should go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fast model used for the first pass.
    Primary,
    /// Stricter, stronger model used for self-repair.
    Repair,
}

/// One opaque prompt plus its system instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub tier: ModelTier,
}

impl GenerationRequest {
    pub fn primary(system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            tier: ModelTier::Primary,
        }
    }

    pub fn repair(system_instruction: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            tier: ModelTier::Repair,
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
