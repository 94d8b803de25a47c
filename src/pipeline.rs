//! Run orchestration.
//!
//! A [`Pipeline`] consumes directory batches from the crawler and, for each
//! file, reads and reduces its metadata, decides whether it needs work,
//! generates a description and keywords, and writes the result back.
//! Progress is reported through a [`ProgressSink`] and the run can be
//! paused or stopped through a [`RunControl`].

mod control;
mod progress;
mod runner;
mod stats;

pub use control::{ControlHandle, RunControl, RunState};
pub use progress::{FileStats, NullSink, ProgressEvent, ProgressSink, TracingSink};
pub use runner::{Pipeline, PipelineBuilder, PipelineError};
pub use stats::{RunStats, RunSummary, format_duration};
