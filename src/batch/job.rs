//! Batch job definitions.

use crate::config::OutputConfig;
use crate::error::MicroImgError;
use crate::metadata::MetadataRecord;

/// Status of a finished batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Job completed successfully.
    Completed,
    /// Job failed with an error.
    Failed,
    /// Job was cancelled before it started or mid-copy.
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One conversion request: an image and where its output goes.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Image to convert.
    pub record: MetadataRecord,
    /// Output folders for this image.
    pub output: OutputConfig,
}

impl ConversionJob {
    /// Create a job.
    pub fn new(record: MetadataRecord, output: OutputConfig) -> Self {
        Self { record, output }
    }
}

/// Result of one batch job, in input order.
#[derive(Debug)]
pub struct JobResult<R> {
    /// Position of the job in the input.
    pub index: usize,

    /// Output or error.
    pub outcome: Result<R, MicroImgError>,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}

impl<R> JobResult<R> {
    /// Status derived from the outcome.
    pub fn status(&self) -> JobStatus {
        match &self.outcome {
            Ok(_) => JobStatus::Completed,
            Err(MicroImgError::Cancelled) => JobStatus::Cancelled,
            Err(_) => JobStatus::Failed,
        }
    }
}
