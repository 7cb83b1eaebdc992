use thiserror::Error;

/// Conditions that stop a conversion. Anything else that goes wrong while copying
/// segment contents is reported with utils::warn and the segment is zero-filled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("not a supported core file: {0}")]
    Format(String),

    #[error("core file does not contain a note segment")]
    MissingSegment,

    #[error("core file does not contain a file mapping (NT_FILE) note")]
    MissingFileTable,

    #[error("malformed note at offset {offset:#x}: {reason}")]
    MalformedNote { offset: usize, reason: String },

    #[error("expected segment contents at offset {expected:#x} but output is at {actual:#x}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("unknown architecture {name} (supported: {supported})")]
    UnknownArch { name: String, supported: String },
}

impl CoreError {
    pub fn format(reason: impl Into<String>) -> Self {
        CoreError::Format(reason.into())
    }

    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        CoreError::MalformedNote {
            offset,
            reason: reason.into(),
        }
    }
}
