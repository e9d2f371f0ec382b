//! Catalog error types

use thiserror::Error;

/// Errors surfaced by the instance-type catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The upstream shape source could not be listed
    #[error("shape source error: {0}")]
    ShapeSource(#[source] anyhow::Error),

    /// A direct lookup found no retained shape with this name
    #[error("shape not found: {0}")]
    NotFound(String),

    /// A shape name could not be parsed into its size components
    #[error("invalid shape {name}: {reason}")]
    InvalidShape { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CatalogError {
    pub fn invalid_shape(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error is a lookup miss rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
