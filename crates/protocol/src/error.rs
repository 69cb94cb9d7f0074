use thiserror::Error;

/// Codec failures. Never panics into caller state; callers decide what to do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The inbound frame is not valid JSON or not a recognizable envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The envelope was fine but a result or event payload had the wrong shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Request params could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(String),
}
