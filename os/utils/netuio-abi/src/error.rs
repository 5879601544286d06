use crate::ControlCode;

/// Errors raised while encoding or decoding protocol records.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AbiError {
    /// Input buffer not exactly the record size, or output buffer too small.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    /// The control code is not one the driver understands.
    #[error("unknown control code {0}")]
    UnknownControlCode(ControlCode),
    /// Config-space access width outside of 1, 2, 4 or 8 bytes.
    #[error("invalid config-space access width {0}")]
    InvalidAccessWidth(u32),
    /// Config-space operation is neither read (0) nor write (1).
    #[error("invalid config-space operation {0}")]
    InvalidOperation(u32),
    /// Status value not part of the protocol.
    #[error("unknown status 0x{0:08X}")]
    UnknownStatus(u32),
}
