//! Progress handler trait and related types.

use crate::error::MicroImgError;
use std::path::{Path, PathBuf};

/// Phase of a sub-container write or batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Reading the image record.
    ReadingMetadata,
    /// Renaming the element and building the header XML.
    ProcessingMetadata,
    /// Writing the XML header block.
    WritingHeader,
    /// Writing memory block descriptors.
    WritingStructure,
    /// Copying the pixel payload.
    CopyingPayload,
    /// Converting a batch of images; one event per finished image.
    BatchConversion,
    /// Operation completed successfully.
    Complete,
    /// Operation failed.
    Failed,
}

impl ProgressPhase {
    /// Get a human-readable description of the phase.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ReadingMetadata => "Reading metadata",
            Self::ProcessingMetadata => "Processing metadata",
            Self::WritingHeader => "Writing XML header",
            Self::WritingStructure => "Writing block structure",
            Self::CopyingPayload => "Copying image data",
            Self::BatchConversion => "Converting images",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Progress event emitted while writing or converting.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Current phase of operation.
    pub phase: ProgressPhase,

    /// Integer percentage, 0 to 100.
    pub percent: u8,

    /// Status message.
    pub message: String,

    /// File being produced, if known.
    pub current_file: Option<PathBuf>,

    /// Payload bytes copied so far.
    pub bytes_copied: u64,

    /// Total payload bytes (if known).
    pub total_bytes: Option<u64>,

    /// Index of the chunk just copied, starting at 1.
    pub chunk: usize,

    /// Number of chunks in the payload copy.
    pub total_chunks: usize,
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self {
            phase: ProgressPhase::ReadingMetadata,
            percent: 0,
            message: String::new(),
            current_file: None,
            bytes_copied: 0,
            total_bytes: None,
            chunk: 0,
            total_chunks: 0,
        }
    }
}

impl ProgressEvent {
    /// Create a new progress event for a phase at a percentage.
    pub fn new(phase: ProgressPhase, percent: u8) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: phase.description().into(),
            ..Default::default()
        }
    }

    /// Replace the status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the file being produced.
    pub fn with_file(mut self, file: &Path) -> Self {
        self.current_file = Some(file.to_path_buf());
        self
    }

    /// Create a payload copy event.
    pub fn copying(
        percent: u8,
        chunk: usize,
        total_chunks: usize,
        bytes_copied: u64,
        total_bytes: u64,
    ) -> Self {
        Self {
            phase: ProgressPhase::CopyingPayload,
            percent: percent.min(100),
            message: format!("Copying chunk {}/{}", chunk, total_chunks),
            bytes_copied,
            total_bytes: Some(total_bytes),
            chunk,
            total_chunks,
            ..Default::default()
        }
    }

    /// Create a completion event.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            percent: 100,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Create a failure event.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            phase: ProgressPhase::Failed,
            message: message.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.total_chunks > 0 {
            write!(
                f,
                "[{:>3}%] [{}/{}] {}",
                self.percent, self.chunk, self.total_chunks, self.message
            )
        } else {
            write!(f, "[{:>3}%] {}", self.percent, self.message)
        }
    }
}

/// Summary handed to [`ProgressHandler::on_complete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSummary {
    /// Items finished successfully.
    pub completed: usize,
    /// Items that failed.
    pub failed: usize,
    /// Payload bytes written.
    pub bytes: u64,
    /// Last output produced, if any.
    pub output: Option<PathBuf>,
}

/// Trait for handling progress updates during writes and conversions.
///
/// Delivery is best effort: implementations must not block for long and
/// cannot abort an operation except through [`ProgressHandler::is_cancelled`].
///
/// # Example
///
/// ```rust,ignore
/// use microimg_extract::progress::{CompletionSummary, ProgressEvent, ProgressHandler};
/// use microimg_extract::error::MicroImgError;
/// use std::path::Path;
///
/// struct PrintProgress;
///
/// impl ProgressHandler for PrintProgress {
///     fn on_progress(&self, event: &ProgressEvent) {
///         println!("{}", event);
///     }
///
///     fn on_error(&self, error: &MicroImgError, file: Option<&Path>) {
///         eprintln!("Error: {} (file: {:?})", error, file);
///     }
///
///     fn on_complete(&self, summary: &CompletionSummary) {
///         println!("Done: {} written", summary.completed);
///     }
/// }
/// ```
pub trait ProgressHandler: Send + Sync {
    /// Called when progress is updated.
    fn on_progress(&self, event: &ProgressEvent);

    /// Called when an error occurs.
    ///
    /// # Arguments
    ///
    /// * `error` - The error that occurred
    /// * `file` - The file being produced when the error occurred (if applicable)
    fn on_error(&self, error: &MicroImgError, file: Option<&Path>) {
        let _ = (error, file);
    }

    /// Called when an operation completes.
    fn on_complete(&self, summary: &CompletionSummary) {
        let _ = summary;
    }

    /// Check if the operation should stop.
    ///
    /// Checked between payload chunks and between batch items.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A no-op progress handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressHandler for NullProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
