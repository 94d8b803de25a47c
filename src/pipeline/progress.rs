use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use super::stats::format_duration;

/// Statistics reported after each generated file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStats {
    /// Time spent on this file.
    pub elapsed: Duration,
    /// Running average over every generated file so far.
    pub average: Duration,
    /// Files handled so far, whatever their outcome.
    pub processed: usize,
    /// Files discovered but not yet handled.
    pub in_queue: usize,
    /// `in_queue * average`.
    pub remaining: Duration,
}

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Free-form status line.
    Message(String),
    /// A file was tagged; carries what the model saw and said.
    ImageData {
        base64_image: String,
        caption: Option<String>,
        keywords: Vec<String>,
        file_path: PathBuf,
    },
    /// Timing after a generated file.
    FileCompleted(FileStats),
}

impl ProgressEvent {
    pub fn message(text: impl Into<String>) -> Self {
        ProgressEvent::Message(text.into())
    }
}

/// Receiver of progress events.
///
/// Sinks are observers only; nothing they do can change the outcome of a
/// run. Any `Fn(&ProgressEvent)` closure is a sink.
pub trait ProgressSink {
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent),
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards progress to `tracing`, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Message(text) => info!("{text}"),
            ProgressEvent::ImageData {
                caption,
                keywords,
                file_path,
                ..
            } => info!(
                file = %file_path.display(),
                caption = caption.as_deref().unwrap_or(""),
                keywords = %keywords.join(", "),
                "tagged image"
            ),
            ProgressEvent::FileCompleted(stats) => info!(
                elapsed = %format_duration(stats.elapsed),
                average = %format_duration(stats.average),
                processed = stats.processed,
                in_queue = stats.in_queue,
                remaining = %format_duration(stats.remaining),
                "file complete"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}
