//! Callback-based progress reporting.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::MicroImgError;

use super::handler::{CompletionSummary, ProgressEvent, ProgressHandler};

type ErrorCallback = Arc<dyn Fn(&MicroImgError, Option<&Path>) + Send + Sync>;
type CompleteCallback = Arc<dyn Fn(&CompletionSummary) + Send + Sync>;

/// A progress handler that invokes a callback function.
///
/// # Example
///
/// ```rust,ignore
/// use microimg_extract::progress::CallbackProgress;
///
/// let progress = CallbackProgress::new(|event| {
///     println!("[{}%] {}", event.percent, event.message);
/// });
///
/// // Stops the payload copy before the next chunk
/// progress.cancel();
/// ```
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    error_callback: Option<ErrorCallback>,
    complete_callback: Option<CompleteCallback>,
    cancelled: AtomicBool,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    /// Create a new callback progress handler.
    ///
    /// # Arguments
    ///
    /// * `callback` - Function to call on each progress update
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            error_callback: None,
            complete_callback: None,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Set an error callback.
    pub fn on_error<E>(mut self, callback: E) -> Self
    where
        E: Fn(&MicroImgError, Option<&Path>) + Send + Sync + 'static,
    {
        self.error_callback = Some(Arc::new(callback));
        self
    }

    /// Set a completion callback.
    pub fn on_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn(&CompletionSummary) + Send + Sync + 'static,
    {
        self.complete_callback = Some(Arc::new(callback));
        self
    }

    /// Request cancellation of the current operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reset the cancellation flag.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl<F> ProgressHandler for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        (self.callback)(event.clone());
    }

    fn on_error(&self, error: &MicroImgError, file: Option<&Path>) {
        if let Some(ref callback) = self.error_callback {
            callback(error, file);
        }
    }

    fn on_complete(&self, summary: &CompletionSummary) {
        if let Some(ref callback) = self.complete_callback {
            callback(summary);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[test]
    fn test_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let progress = CallbackProgress::new(move |event| {
            seen_clone.lock().unwrap().push(event.percent);
        });

        progress.on_progress(&ProgressEvent::default());
        progress.on_progress(&ProgressEvent::complete("done"));
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    }

    #[test]
    fn test_callback_with_error_and_complete_handlers() {
        let errors = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let errors_clone = errors.clone();
        let completed_clone = completed.clone();

        let progress = CallbackProgress::new(|_| {})
            .on_error(move |_, _| {
                errors_clone.fetch_add(1, Ordering::SeqCst);
            })
            .on_complete(move |summary| {
                completed_clone.fetch_add(summary.completed, Ordering::SeqCst);
            });

        ProgressHandler::on_error(&progress, &MicroImgError::Cancelled, None);
        ProgressHandler::on_complete(
            &progress,
            &CompletionSummary {
                completed: 2,
                ..Default::default()
            },
        );
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancellation_flag() {
        let progress = CallbackProgress::new(|_| {});
        assert!(!progress.is_cancelled());
        progress.cancel();
        assert!(progress.is_cancelled());
        progress.reset();
        assert!(!progress.is_cancelled());
    }
}
