//! The enumerated set of supported embedding models.

use crate::error::{RagError, RagResult};
use crate::vector::VectorDimension;
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Embedding models the pipeline knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmbeddingModelName {
    /// sentence-transformers/all-MiniLM-L6-v2
    AllMiniLmL6V2,
    /// intfloat e5 small
    E5Small,
    /// intfloat e5 large, slower
    E5Large,
}

impl EmbeddingModelName {
    pub const ALL: [EmbeddingModelName; 3] = [Self::AllMiniLmL6V2, Self::E5Small, Self::E5Large];

    /// Canonical name used in config files, requests and manifests.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::E5Small => "e5-small",
            Self::E5Large => "e5-large",
        }
    }

    /// Dimension the backend model produces.
    pub fn dimension(&self) -> VectorDimension {
        match self {
            Self::AllMiniLmL6V2 | Self::E5Small => VectorDimension::dimension_384(),
            Self::E5Large => VectorDimension::dimension_1024(),
        }
    }

    /// The fastembed model this name maps to.
    pub fn fastembed_model(&self) -> EmbeddingModel {
        match self {
            Self::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
            Self::E5Small => EmbeddingModel::MultilingualE5Small,
            Self::E5Large => EmbeddingModel::MultilingualE5Large,
        }
    }

    /// Comma-separated list for error messages.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse a user-supplied model name.
    pub fn parse(name: &str) -> RagResult<Self> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RagError::ModelNotFound {
                name: name.to_string(),
                supported: Self::supported_list(),
            })
    }
}

impl FromStr for EmbeddingModelName {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmbeddingModelName {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmbeddingModelName> for String {
    fn from(model: EmbeddingModelName) -> String {
        model.as_str().to_string()
    }
}

impl std::fmt::Display for EmbeddingModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model identity recorded with an index: which model, which dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: EmbeddingModelName,
    pub dimension: VectorDimension,
}

impl ModelInfo {
    pub fn new(name: EmbeddingModelName, dimension: VectorDimension) -> Self {
        Self { name, dimension }
    }
}
