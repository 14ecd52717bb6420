//! Parallel helpers for sampling and converting many images.
//!
//! # Example
//!
//! ```rust,ignore
//! use microimg_extract::batch::{convert_all, BatchScheduler, ConversionJob};
//! use microimg_extract::progress::CallbackProgress;
//!
//! let progress = CallbackProgress::new(|event| println!("{}", event));
//! let report = convert_all(&BatchScheduler::default(), &converter, jobs, &progress)?;
//! println!("{} converted, {} failed", report.successful, report.failed);
//! ```

mod job;
mod scheduler;

pub use job::{ConversionJob, JobResult, JobStatus};
pub use scheduler::BatchScheduler;

use std::path::Path;
use std::time::Instant;

use crate::config::SamplerConfig;
use crate::convert::{ConversionResult, Converter, OmeTiffEncoder};
use crate::error::{MicroImgError, Result};
use crate::metadata::MetadataRecord;
use crate::progress::{CompletionSummary, ProgressEvent, ProgressHandler, ProgressPhase};
use crate::stats::{sample, ChannelStats};

/// Aggregate outcome of [`convert_all`].
#[derive(Debug)]
pub struct BatchReport {
    /// Per-job results in input order.
    pub results: Vec<JobResult<ConversionResult>>,
    /// Jobs that produced an output.
    pub successful: usize,
    /// Jobs that failed or were cancelled.
    pub failed: usize,
    /// Wall-clock time in milliseconds.
    pub total_time_ms: u64,
}

/// Sample every record in parallel. Order follows `records`.
pub fn sample_all(
    scheduler: &BatchScheduler,
    records: &[MetadataRecord],
    config: &SamplerConfig,
) -> Result<Vec<ChannelStats>> {
    let results = scheduler.schedule(records.iter().collect(), |record| Ok(sample(record, config)))?;
    // sampling itself never fails; errors here come from cancellation
    results.into_iter().map(|r| r.outcome).collect()
}

/// Convert every job in parallel, each to its own output location.
///
/// `progress` receives one event per finished job and is polled for
/// cancellation by every conversion. Concurrent jobs must not share a
/// destination file.
pub fn convert_all<E: OmeTiffEncoder>(
    scheduler: &BatchScheduler,
    converter: &Converter<E>,
    jobs: Vec<ConversionJob>,
    progress: &dyn ProgressHandler,
) -> Result<BatchReport> {
    let start = Instant::now();
    let total = jobs.len();
    let relay = CancelRelay { inner: progress };

    let results = scheduler.schedule_with_progress(
        jobs,
        |job| {
            let result = converter.convert(&job.record, &job.output, &relay);
            if let Err(ref e) = result {
                progress.on_error(e, Some(job.record.file_path.as_path()));
            }
            result
        },
        |done, total| {
            let percent = (done * 100 / total.max(1)) as u8;
            progress.on_progress(
                &ProgressEvent::new(ProgressPhase::BatchConversion, percent)
                    .with_message(format!("Converted {}/{} images", done, total)),
            );
        },
    )?;

    let successful = results.iter().filter(|r| r.outcome.is_ok()).count();
    let report = BatchReport {
        successful,
        failed: total - successful,
        total_time_ms: start.elapsed().as_millis() as u64,
        results,
    };

    progress.on_complete(&CompletionSummary {
        completed: report.successful,
        failed: report.failed,
        bytes: 0,
        output: None,
    });
    log::info!(
        "Batch finished: {} converted, {} failed in {} ms",
        report.successful,
        report.failed,
        report.total_time_ms
    );
    Ok(report)
}

/// Forwards cancellation only; per-chunk events of parallel writes would interleave.
struct CancelRelay<'a> {
    inner: &'a dyn ProgressHandler,
}

impl ProgressHandler for CancelRelay<'_> {
    fn on_progress(&self, _event: &ProgressEvent) {}

    fn on_error(&self, _error: &MicroImgError, _file: Option<&Path>) {}

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}
