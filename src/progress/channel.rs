//! Channel-based progress reporting.
//!
//! Events are sent through an MPSC channel so another thread (a progress
//! bar, a server-sent-events relay) can consume them.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crate::error::MicroImgError;

use super::handler::{CompletionSummary, ProgressEvent, ProgressHandler};

/// Channel-based progress handler.
///
/// # Example
///
/// ```rust,ignore
/// use microimg_extract::progress::ChannelProgress;
/// use std::thread;
///
/// let (progress, receiver) = ChannelProgress::new();
///
/// thread::spawn(move || {
///     for event in receiver.iter() {
///         println!("{}", event);
///         if event.phase.is_terminal() {
///             break;
///         }
///     }
/// });
/// ```
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
    cancelled: Arc<AtomicBool>,
}

impl ChannelProgress {
    /// Create a new channel progress handler and its receiver.
    pub fn new() -> (Self, ProgressReceiver) {
        let (sender, receiver) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let handler = Self {
            sender,
            cancelled: cancelled.clone(),
        };

        (handler, ProgressReceiver { receiver, cancelled })
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ProgressHandler for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        // The receiver may be gone; progress never aborts the operation.
        let _ = self.sender.send(event.clone());
    }

    fn on_error(&self, error: &MicroImgError, file: Option<&Path>) {
        let mut event = ProgressEvent::failed(error.to_string());
        event.current_file = file.map(|p| p.to_path_buf());
        let _ = self.sender.send(event);
    }

    fn on_complete(&self, summary: &CompletionSummary) {
        let mut event = ProgressEvent::complete(format!("Completed {} item(s)", summary.completed));
        event.bytes_copied = summary.bytes;
        event.current_file = summary.output.clone();
        let _ = self.sender.send(event);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receiver for progress events.
pub struct ProgressReceiver {
    receiver: Receiver<ProgressEvent>,
    cancelled: Arc<AtomicBool>,
}

impl ProgressReceiver {
    /// Block and wait for the next progress event.
    pub fn recv(&self) -> Result<ProgressEvent, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a progress event without blocking.
    pub fn try_recv(&self) -> Result<ProgressEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait for an event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ProgressEvent, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Iterate over all received events.
    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.receiver.iter()
    }

    /// Non-blocking iterator over available events.
    pub fn try_iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.receiver.try_iter()
    }

    /// Request cancellation of the operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Collect events until a terminal one arrives or the sender is dropped.
    pub fn collect_until_complete(&self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.recv() {
            let is_terminal = event.phase.is_terminal();
            events.push(event);
            if is_terminal {
                break;
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressPhase;

    #[test]
    fn test_channel_progress_send_receive() {
        let (progress, receiver) = ChannelProgress::new();

        progress.on_progress(&ProgressEvent::new(ProgressPhase::WritingHeader, 30));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.phase, ProgressPhase::WritingHeader);
        assert_eq!(received.percent, 30);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let (progress, receiver) = ChannelProgress::new();
        assert!(!progress.is_cancelled());

        receiver.cancel();
        assert!(progress.is_cancelled());
    }

    #[test]
    fn test_on_error_sends_failed_event() {
        let (progress, receiver) = ChannelProgress::new();
        let path = Path::new("/out/image.lif");

        progress.on_error(&MicroImgError::Internal("disk full".into()), Some(path));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.phase, ProgressPhase::Failed);
        assert!(received.message.contains("disk full"));
        assert_eq!(received.current_file.as_deref(), Some(path));
    }

    #[test]
    fn test_collect_until_complete_stops_at_terminal() {
        let (progress, receiver) = ChannelProgress::new();
        progress.on_progress(&ProgressEvent::new(ProgressPhase::ReadingMetadata, 5));
        progress.on_complete(&CompletionSummary {
            completed: 1,
            bytes: 42,
            ..Default::default()
        });
        progress.on_progress(&ProgressEvent::default());

        let events = receiver.collect_until_complete();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].percent, 100);
        assert_eq!(events[1].bytes_copied, 42);
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (progress, receiver) = ChannelProgress::new();
        drop(receiver);
        progress.on_progress(&ProgressEvent::default());
    }
}
