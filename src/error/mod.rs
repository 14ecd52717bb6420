//! Error types for the microscopy container extraction library.

use thiserror::Error;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, MicroImgError>;

/// Main error type for the microscopy container extraction library.
#[derive(Error, Debug)]
pub enum MicroImgError {
    /// Source cannot be read: missing file, degenerate geometry or unknown file type.
    #[error("Source unavailable: {0}")]
    UnavailableSource(String),

    /// Required descriptor fields are missing or inconsistent.
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    /// Seek/read/write failure at a known position.
    #[error("I/O error while {context} (offset {offset}, {len} bytes): {source}")]
    IoAt {
        /// What the operation was doing.
        context: String,
        /// Absolute byte offset the operation targeted.
        offset: u64,
        /// Number of bytes attempted.
        len: u64,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error without positional context.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container structure does not match the expected block layout.
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation aborted through the progress handler.
    #[error("Operation cancelled")]
    Cancelled,

    /// External encoder reported failure.
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MicroImgError {
    /// Attach offset and length context to an I/O error.
    pub fn io_at(context: impl Into<String>, offset: u64, len: u64, source: std::io::Error) -> Self {
        MicroImgError::IoAt {
            context: context.into(),
            offset,
            len,
            source,
        }
    }

    /// True for "bad input" failures.
    pub fn is_metadata_error(&self) -> bool {
        matches!(self, MicroImgError::MalformedMetadata(_))
    }

    /// True for "bad disk/permissions" failures.
    pub fn is_io_error(&self) -> bool {
        matches!(self, MicroImgError::IoAt { .. } | MicroImgError::Io(_))
    }
}

impl From<serde_json::Error> for MicroImgError {
    fn from(err: serde_json::Error) -> Self {
        MicroImgError::MalformedMetadata(err.to_string())
    }
}

impl From<toml::de::Error> for MicroImgError {
    fn from(err: toml::de::Error) -> Self {
        MicroImgError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let meta = MicroImgError::MalformedMetadata("missing BlockID".into());
        assert!(meta.is_metadata_error());
        assert!(!meta.is_io_error());

        let io = MicroImgError::io_at(
            "copying payload",
            1024,
            512,
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read"),
        );
        assert!(io.is_io_error());
        assert!(!io.is_metadata_error());
    }

    #[test]
    fn test_io_error_message_carries_position() {
        let err = MicroImgError::io_at(
            "reading row",
            4096,
            100,
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        );
        let message = err.to_string();
        assert!(message.contains("offset 4096"));
        assert!(message.contains("100 bytes"));
    }
}
