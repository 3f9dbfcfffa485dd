use thiserror::Error;

/// Reasons a signed webhook header fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header is empty")]
    MissingHeader,

    #[error("missing timestamp (t=) in signature header")]
    MissingTimestamp,

    #[error("missing v1 signature in signature header")]
    MissingSignature,

    #[error("invalid timestamp in signature header")]
    InvalidTimestamp,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("no signature matched the payload")]
    Mismatch,
}
