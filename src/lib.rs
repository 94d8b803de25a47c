//! Unattended image tagging.
//!
//! `phototag` walks a directory tree, asks a vision model served over an
//! OpenAI-compatible endpoint for a description and keywords for each image,
//! normalizes the keywords, and writes everything back into the file's own
//! metadata through ExifTool. A per-file identifier and status make repeated
//! runs cheap: work that already succeeded is never redone.

pub mod config;
pub mod crawler;
pub mod generator;
pub mod imaging;
pub mod keywords;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod status;

pub use config::{CaptionMode, TaggerConfig};
pub use models::{Batch, CanonicalRecord, FileId, Status};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError, RunSummary};
