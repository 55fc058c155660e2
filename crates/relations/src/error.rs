//! Error types for the relations engine
//!
//! Every failure in relationship construction, eager loading, casting and
//! cascading saves is reported through [`ModelError`]. Nothing in this crate
//! retries; errors surface synchronously to the caller.

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for relationship, schema and graph operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// A required option is missing or a value has the wrong shape
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A save did not produce the key its relationship depends on
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Unknown model, relation name or dotted path segment
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// A raw value could not be converted to the declared field type
    #[error("Cast error: {0}")]
    Cast(String),

    /// Failure reported by the data source
    #[error("Data source error: {0}")]
    Source(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    /// Returns true for errors raised while wiring schemas and relations
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModelError::Configuration(_))
    }

    /// Returns true for errors raised by a save that lost a related key
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, ModelError::DataIntegrity(_))
    }

    /// Returns true for unknown model or relation names
    pub fn is_lookup(&self) -> bool {
        matches!(self, ModelError::Lookup(_))
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
