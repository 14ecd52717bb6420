//! Progress reporting for sub-container writes and batch conversions.
//!
//! This module provides a small progress API that supports:
//! - Callback-based progress reporting
//! - Channel-based progress for consumers on another thread
//! - Cooperative cancellation
//!
//! # Example
//!
//! ```rust,ignore
//! use microimg_extract::progress::CallbackProgress;
//! use microimg_extract::writer::SubContainerWriter;
//!
//! let progress = CallbackProgress::new(|event| {
//!     println!("{}% {}", event.percent, event.message);
//! });
//!
//! let outcome = SubContainerWriter::default().write_single_image(&record, &output, &progress)?;
//! ```

mod callback;
mod channel;
mod handler;

pub use callback::CallbackProgress;
pub use channel::{ChannelProgress, ProgressReceiver};
pub use handler::{CompletionSummary, NullProgress, ProgressEvent, ProgressHandler, ProgressPhase};
