//! Error types for the framed messenger and the message taxonomy (§7).

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    /// Read/write returned short or zero before a frame completed.
    #[error("transport broken: connection closed mid-frame")]
    TransportBroken,

    /// Length prefix parsed but the payload failed to decode, or the tag
    /// was unrecognized.
    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    /// A message of a known tag arrived with fields inconsistent with the
    /// current per-file session (e.g. `SEND_CHUNK` without `SEND_FILE`).
    #[error("protocol state violation: {0}")]
    StateViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
