/// Reasons a decoding path stops early.
///
/// None of these escape the public entry points: the decoder is best-effort,
/// so a stop only means fewer (or no) headers were extracted. Already written
/// stream fields are kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The read would cross the declared buffer length.
    #[error("read of {needed} bytes at offset {offset} exceeds buffer length {len}")]
    Truncated { offset: u32, needed: u32, len: u32 },

    /// The bytes lie within the declared length but the memory behind them
    /// could not be read.
    #[error("user buffer fault at offset {offset}")]
    Fault { offset: u32 },

    /// An HPACK integer needs more than one continuation byte.
    #[error("HPACK integer at offset {offset} exceeds a single continuation byte")]
    IntegerOverflow { offset: u32 },

    /// The 9-octet frame header is all zeroes or names an unknown frame type.
    #[error("invalid frame header")]
    InvalidFrameHeader,

    #[error("static table has no entry for index {0}")]
    MissingStaticEntry(u64),

    #[error("dynamic table has no entry for index {0}")]
    MissingDynamicEntry(u64),

    #[error("dynamic counter storage unavailable")]
    CounterUnavailable,

    #[error("stream table unavailable")]
    StreamUnavailable,
}

impl DecodeError {
    /// Benign stops come from the input itself (truncation, an unparseable
    /// frame header); the rest indicate a fault or a broken table invariant.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::InvalidFrameHeader)
    }
}
