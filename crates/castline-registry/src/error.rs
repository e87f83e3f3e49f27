//! Error types for the registry layer.

/// Errors from building subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The regular expression did not compile.
    #[error("invalid channel pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
