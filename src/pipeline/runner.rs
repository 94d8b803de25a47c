use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::control::{ControlHandle, RunControl, RunState};
use super::progress::{ProgressEvent, ProgressSink, TracingSink};
use super::stats::{RunStats, RunSummary};
use crate::config::TaggerConfig;
use crate::crawler::{Crawler, path_file_type};
use crate::generator::CaptionGenerator;
use crate::imaging::prepare_image;
use crate::keywords::KeywordNormalizer;
use crate::metadata::{MetadataError, MetadataGateway, RawFieldMap, reduce};
use crate::models::{Batch, CanonicalRecord, Status};
use crate::status::{Decision, SkipReason, decide};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The metadata tool could not be started.
    #[error("Metadata gateway failed to start: {0}")]
    Gateway(#[from] MetadataError),

    /// No generation call in the run reached the endpoint.
    #[error("Inference endpoint unreachable after {calls} attempts")]
    EndpointUnreachable { calls: u32 },

    /// The crawl could not start.
    #[error("Failed to crawl {path}: {source}")]
    Crawler {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

enum Flow {
    Continue,
    Stop,
}

/// Builder for constructing `Pipeline` instances.
///
/// The gateway and generator are required; the sink defaults to
/// [`TracingSink`] and the control to a fresh [`ControlHandle`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: TaggerConfig,
    gateway: Option<Box<dyn MetadataGateway>>,
    generator: Option<CaptionGenerator>,
    sink: Option<Box<dyn ProgressSink>>,
    control: Option<Box<dyn RunControl>>,
}

impl PipelineBuilder {
    pub fn new(config: TaggerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn gateway(mut self, gateway: Box<dyn MetadataGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn generator(mut self, generator: CaptionGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn control(mut self, control: Box<dyn RunControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Builds the `Pipeline`.
    ///
    /// # Panics
    ///
    /// Panics if `gateway()` or `generator()` was not called before `build()`.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let normalizer = KeywordNormalizer::with_banned_words(
            self.config.normalizer.clone(),
            &self.config.banned_words,
        );
        Pipeline {
            gateway: self.gateway.expect("gateway must be set via gateway() method"),
            generator: self
                .generator
                .expect("generator must be set via generator() method"),
            sink: self.sink.unwrap_or_else(|| Box::new(TracingSink)),
            control: self
                .control
                .unwrap_or_else(|| Box::new(ControlHandle::new())),
            normalizer,
            config: self.config,
        }
    }
}

/// Drives a tagging run: crawl, read, decide, generate, write.
///
/// The crawler thread and the pipeline share only the batch queue. All
/// metadata access goes through the one gateway, serially, and the gateway
/// is shut down when the run ends however it ends.
pub struct Pipeline {
    config: TaggerConfig,
    gateway: Box<dyn MetadataGateway>,
    generator: CaptionGenerator,
    normalizer: KeywordNormalizer,
    sink: Box<dyn ProgressSink>,
    control: Box<dyn RunControl>,
}

/// Mutable state for one run.
#[derive(Default)]
struct RunContext {
    summary: RunSummary,
    stats: RunStats,
    seen: HashSet<PathBuf>,
}

impl Pipeline {
    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    /// Tags every supported image under `root`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Crawler` if `root` cannot be crawled and
    /// `PipelineError::EndpointUnreachable` if no generation call reached the
    /// endpoint. Per-file failures are counted in the summary instead.
    pub fn run(&mut self, root: &Path) -> Result<RunSummary, PipelineError> {
        info!(root = %root.display(), dry_run = self.config.dry_run, "starting run");

        let result = Crawler::start(root, self.config.recursive)
            .map_err(|source| PipelineError::Crawler {
                path: root.to_path_buf(),
                source,
            })
            .and_then(|crawler| {
                let result = self.drain(&crawler);
                let queued = crawler.finish();
                debug!(queued, "crawler finished");
                result
            });

        if let Err(e) = self.gateway.shutdown() {
            warn!(error = %e, "metadata gateway did not shut down cleanly");
        }

        let summary = result?;
        self.emit(format!(
            "Run complete: {} processed, {} succeeded, {} failed, {} skipped",
            summary.processed, summary.succeeded, summary.failed, summary.skipped
        ));
        Ok(summary)
    }

    fn drain(&mut self, crawler: &Crawler) -> Result<RunSummary, PipelineError> {
        let mut run = RunContext::default();
        let mut pending: VecDeque<Batch> = VecDeque::new();
        let mut crawl_done = false;

        loop {
            if self.wait_while_paused() {
                run.summary.stopped = true;
                break;
            }

            while !crawl_done {
                match crawler.receiver().try_recv() {
                    Ok(batch) => self.enqueue(&mut run, &mut pending, batch),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => crawl_done = true,
                }
            }

            let Some(batch) = pending.pop_front() else {
                if crawl_done {
                    break;
                }
                match crawler.receiver().recv_timeout(POLL_INTERVAL) {
                    Ok(batch) => self.enqueue(&mut run, &mut pending, batch),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => crawl_done = true,
                }
                continue;
            };

            if let Flow::Stop = self.process_batch(&mut run, batch)? {
                run.summary.stopped = true;
                break;
            }
        }

        if run.summary.stopped {
            self.emit("Run stopped");
        }

        run.summary.discovered = run.stats.discovered();
        run.summary.processed = run.stats.processed();

        match endpoint_error(&run.summary) {
            Some(e) => Err(e),
            None => Ok(run.summary),
        }
    }

    /// Drops files already seen this run so overlapping batches never
    /// process a file twice.
    fn enqueue(&self, run: &mut RunContext, pending: &mut VecDeque<Batch>, batch: Batch) {
        let Batch { directory, files } = batch;
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| run.seen.insert(file.clone()))
            .collect();
        if files.is_empty() {
            return;
        }
        run.stats.discover(files.len());
        pending.push_back(Batch::new(directory, files));
    }

    /// Returns true when the run should stop.
    fn wait_while_paused(&self) -> bool {
        loop {
            match self.control.state() {
                RunState::Running => return false,
                RunState::Stopped => return true,
                RunState::Paused => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    fn process_batch(
        &mut self,
        run: &mut RunContext,
        batch: Batch,
    ) -> Result<Flow, PipelineError> {
        self.emit(format!(
            "Processing {} ({} files, {} remaining in queue)",
            batch.directory.display(),
            batch.len(),
            run.stats.in_queue()
        ));

        let mut readable = Vec::with_capacity(batch.len());
        for file in batch.files {
            if !file.is_file() {
                self.skip_file(run, format!("File not found, skipping: {}", file.display()));
            } else if path_file_type(&file).is_none() {
                let message = format!("Unsupported file type, skipping: {}", file.display());
                self.skip_file(run, message);
            } else {
                readable.push(file);
            }
        }
        if readable.is_empty() {
            return Ok(Flow::Continue);
        }

        let raw_maps = match self.gateway.read_batch(&readable, self.config.validate) {
            Ok(maps) => maps,
            Err(e) => {
                warn!(directory = %batch.directory.display(), error = %e, "metadata read failed");
                for _ in &readable {
                    run.stats.record_handled();
                    run.summary.skipped += 1;
                }
                self.emit(format!(
                    "Could not read metadata in {}: {e}",
                    batch.directory.display()
                ));
                return Ok(Flow::Continue);
            }
        };
        let mut by_path: HashMap<PathBuf, RawFieldMap> = raw_maps
            .into_iter()
            .map(|raw| (raw.source_file.clone(), raw))
            .collect();

        for (index, file) in readable.iter().enumerate() {
            if index > 0 && self.wait_while_paused() {
                return Ok(Flow::Stop);
            }

            let Some(raw) = by_path.remove(file) else {
                let message = format!("No metadata returned, skipping: {}", file.display());
                self.skip_file(run, message);
                continue;
            };
            self.process_file(run, &raw)?;
        }

        Ok(Flow::Continue)
    }

    fn process_file(
        &mut self,
        run: &mut RunContext,
        raw: &RawFieldMap,
    ) -> Result<(), PipelineError> {
        let path = raw.source_file.as_path();

        if self.config.validate
            && let Some(validation) = raw.validation
            && validation.has_errors()
        {
            self.skip_file(
                run,
                format!(
                    "Metadata validation failed ({} errors), skipping: {}",
                    validation.errors,
                    path.display()
                ),
            );
            return Ok(());
        }

        match decide(reduce(raw), &self.config.status_policy()) {
            Decision::Skip(reason) => {
                let why = match reason {
                    SkipReason::AlreadyTagged => "already tagged",
                    SkipReason::Failed => "previously failed",
                    SkipReason::Complete => "already complete",
                };
                self.skip_file(run, format!("Skipping {} ({why})", path.display()));
            }
            Decision::RepairOrphan(record) => {
                run.stats.record_handled();
                if self.persist(run, &record) {
                    run.summary.orphans_repaired += 1;
                    self.emit(format!("Marked orphan as tagged: {}", path.display()));
                }
            }
            Decision::Proceed { record, reason } => {
                debug!(file = %path.display(), ?reason, "generating");
                self.generate_file(run, record)?;
            }
        }
        Ok(())
    }

    fn generate_file(
        &mut self,
        run: &mut RunContext,
        mut record: CanonicalRecord,
    ) -> Result<(), PipelineError> {
        let started = Instant::now();
        let path = record.source_file.clone();

        let image = match prepare_image(&path, self.config.resolution_limit) {
            Ok(image) => image,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "image could not be prepared");
                self.skip_file(run, format!("Cannot load image, skipping: {}", path.display()));
                return Ok(());
            }
        };

        let mut outcome = None;
        let max_attempts = self.config.max_attempts();

        for attempt in 1..=max_attempts {
            let generated = self.generator.run(self.config.caption_mode, &image.jpeg);
            run.summary.generation_calls += generated.calls;
            run.summary.unreachable_calls += generated.unreachable;

            if let Some(result) = generated.result {
                let keywords = self
                    .normalizer
                    .normalize_all(result.keywords.iter().flatten());
                if !keywords.is_empty() {
                    outcome = Some((result.description, keywords));
                    break;
                }
            }

            record.status = Some(Status::Retry);
            if attempt < max_attempts {
                run.summary.retries += 1;
                self.emit(format!("No keywords for {}, retrying", path.display()));
            }
        }

        let Some((description, mut keywords)) = outcome else {
            record.status = Some(Status::Failed);
            run.stats.record_handled();
            if self.persist(run, &record) {
                run.summary.failed += 1;
            }
            self.emit(format!("Failed to generate keywords: {}", path.display()));
            return Ok(());
        };

        if self.config.update_keywords {
            keywords.extend(self.normalizer.normalize_all(&record.keywords));
        }
        record.description = self
            .config
            .compose_description(record.existing_description(), description.as_deref());
        record.keywords = keywords;
        record.status = Some(Status::Success);

        let written = self.persist(run, &record);
        let stats = run.stats.record_generated(started.elapsed());
        if !written {
            return Ok(());
        }
        run.summary.succeeded += 1;

        self.sink.emit(&ProgressEvent::ImageData {
            base64_image: general_purpose::STANDARD.encode(&image.jpeg),
            caption: record.description.clone(),
            keywords: record.keywords.iter().cloned().collect(),
            file_path: path,
        });
        self.sink.emit(&ProgressEvent::FileCompleted(stats));
        Ok(())
    }

    /// Writes `record` through the gateway; returns false on failure.
    fn persist(&mut self, run: &mut RunContext, record: &CanonicalRecord) -> bool {
        match self.gateway.write(record, self.config.write_options()) {
            Ok(()) => true,
            Err(e) => {
                warn!(file = %record.source_file.display(), error = %e, "metadata write failed");
                run.summary.write_errors += 1;
                self.emit(format!(
                    "Failed to write metadata for {}: {e}",
                    record.source_file.display()
                ));
                false
            }
        }
    }

    fn skip_file(&self, run: &mut RunContext, message: String) {
        run.stats.record_handled();
        run.summary.skipped += 1;
        self.emit(message);
    }

    fn emit(&self, message: impl Into<String>) {
        self.sink.emit(&ProgressEvent::message(message));
    }
}

/// A run whose every generation call failed to reach the endpoint is an
/// error, even though each file it touched has already been marked failed.
fn endpoint_error(summary: &RunSummary) -> Option<PipelineError> {
    (summary.generation_calls > 0 && summary.unreachable_calls == summary.generation_calls)
        .then_some(PipelineError::EndpointUnreachable {
            calls: summary.generation_calls,
        })
}
