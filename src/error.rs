use thiserror::Error;

/// Errors raised by the engine's internal plumbing.
///
/// None of these cross the public API boundary: every public operation
/// degrades to a logged no-op instead, so the engine can never
/// destabilize the application it profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// I/O failure (event log file, /proc reads, helper process)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration file or value
    #[error("configuration error: {0}")]
    Config(String),

    /// GPU helper emitted output that does not match the expected framing
    #[error("malformed GPU helper output: {0}")]
    MalformedStream(String),
}
