/// End-to-end pipeline runs against an in-memory metadata store and a
/// scripted model client.
///
/// Images are real PNG files written to temporary directories, so crawling
/// and image preparation run exactly as in production; only the metadata
/// tool and the inference endpoint are replaced.
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use phototag::generator::CaptionGeneratorBuilder;
use phototag::llm::{ChatRequest, LlmClient, LlmClientBuilder, LlmClientTrait, LlmError};
use phototag::metadata::{MetadataError, MetadataGateway, RawFieldMap, ValidationSummary, WriteOptions};
use phototag::pipeline::{
    PipelineBuilder, PipelineError, ProgressEvent, RunState, RunSummary,
};
use phototag::{CanonicalRecord, FileId, Status, TaggerConfig};
use serde_json::{Value, json};
use tempfile::TempDir;

const GOOD_REPLY: &str =
    r#"{"Description": "A small square.", "Keywords": ["Blue Sky", "BLUESKY ", "Cats", "photography"]}"#;

#[derive(Default)]
struct Store {
    records: HashMap<PathBuf, CanonicalRecord>,
    invalid: Vec<PathBuf>,
    writes: usize,
    dry_writes: usize,
    shutdowns: usize,
}

#[derive(Clone, Default)]
struct MemoryGateway {
    store: Arc<Mutex<Store>>,
}

impl MemoryGateway {
    fn record(&self, path: &Path) -> Option<CanonicalRecord> {
        self.store.lock().unwrap().records.get(path).cloned()
    }

    fn insert(&self, record: CanonicalRecord) {
        self.store
            .lock()
            .unwrap()
            .records
            .insert(record.source_file.clone(), record);
    }

    fn writes(&self) -> usize {
        self.store.lock().unwrap().writes
    }
}

impl MetadataGateway for MemoryGateway {
    fn read_batch(
        &mut self,
        files: &[PathBuf],
        validate: bool,
    ) -> Result<Vec<RawFieldMap>, MetadataError> {
        let store = self.store.lock().unwrap();
        Ok(files
            .iter()
            .map(|file| {
                let mut raw = RawFieldMap::new(file.clone());
                if let Some(record) = store.records.get(file) {
                    if let Some(id) = &record.identifier {
                        raw = raw.with_field("XMP:Identifier", json!(id.as_str()));
                    }
                    if let Some(status) = record.status {
                        raw = raw.with_field("XMP:Status", json!(status.as_str()));
                    }
                    if let Some(description) = &record.description {
                        raw = raw.with_field("XMP:Description", json!(description));
                    }
                    if !record.keywords.is_empty() {
                        let keywords: Vec<Value> =
                            record.keywords.iter().map(|k| json!(k)).collect();
                        raw = raw.with_field("XMP:Subject", Value::Array(keywords));
                    }
                }
                if validate {
                    let errors = u32::from(store.invalid.contains(file));
                    raw.validation = Some(ValidationSummary {
                        errors,
                        warnings: 0,
                        minor_warnings: 0,
                    });
                }
                raw
            })
            .collect())
    }

    fn write(
        &mut self,
        record: &CanonicalRecord,
        options: WriteOptions,
    ) -> Result<(), MetadataError> {
        let mut store = self.store.lock().unwrap();
        if options.dry_run {
            store.dry_writes += 1;
        } else {
            store.writes += 1;
            store
                .records
                .insert(record.source_file.clone(), record.clone());
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), MetadataError> {
        self.store.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}

/// Replies from a script, then repeats the fallback reply forever.
struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    calls: Mutex<usize>,
}

impl ScriptedClient {
    fn always(reply: &str) -> Arc<Self> {
        Self::script(&[], reply)
    }

    fn script(replies: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl LlmClientTrait for ScriptedClient {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        assert!(!request.image_jpeg.is_empty(), "image must be attached");
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

fn write_png(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::from_pixel(8, 6, image::Rgb([30, 90, 200]))
        .save(path)
        .unwrap();
}

fn library(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        write_png(&dir.path().join(name));
    }
    dir
}

struct Harness {
    gateway: MemoryGateway,
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            gateway: MemoryGateway::default(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn run(
        &self,
        config: TaggerConfig,
        client: Arc<dyn LlmClientTrait>,
        root: &Path,
    ) -> Result<RunSummary, PipelineError> {
        let events = Arc::clone(&self.events);
        PipelineBuilder::new(config)
            .gateway(Box::new(self.gateway.clone()))
            .generator(CaptionGeneratorBuilder::new().client(client).build())
            .sink(Box::new(move |event: &ProgressEvent| {
                events.lock().unwrap().push(event.clone())
            }))
            .build()
            .run(root)
    }

    fn image_events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::ImageData { .. }))
            .cloned()
            .collect()
    }
}

#[test]
fn first_run_tags_every_image_with_normalized_keywords() {
    let dir = library(&["a.png", "nested/b.png"]);
    let harness = Harness::new();
    let client = ScriptedClient::always(GOOD_REPLY);

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.generation_calls, 2);
    assert_eq!(client.calls(), 2);

    let record = harness.gateway.record(&dir.path().join("a.png")).unwrap();
    assert!(record.identifier.is_some());
    assert_eq!(record.status, Some(Status::Success));
    assert_eq!(record.description.as_deref(), Some("A small square."));
    let keywords: Vec<&str> = record.keywords.iter().map(String::as_str).collect();
    assert_eq!(keywords, vec!["blue sky", "cat"]);

    assert_eq!(harness.image_events().len(), 2);
    assert_eq!(harness.gateway.store.lock().unwrap().shutdowns, 1);
}

#[test]
fn second_run_is_a_no_op() {
    let dir = library(&["a.png", "b.png", "c.png"]);
    let harness = Harness::new();

    harness
        .run(TaggerConfig::default(), ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();
    let writes_after_first = harness.gateway.writes();

    let client = ScriptedClient::always(GOOD_REPLY);
    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 0);
    assert_eq!(summary.generation_calls, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(harness.gateway.writes(), writes_after_first);
}

#[test]
fn no_keywords_retries_once_then_fails() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();
    let client = ScriptedClient::always("I cannot help with that.");

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.failed, 1);
    let record = harness.gateway.record(&dir.path().join("a.png")).unwrap();
    assert_eq!(record.status, Some(Status::Failed));
    assert!(record.identifier.is_some());
}

#[test]
fn quick_fail_makes_a_single_attempt() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();
    let client = ScriptedClient::always("{}");
    let config = TaggerConfig {
        quick_fail: true,
        ..TaggerConfig::default()
    };

    let summary = harness.run(config, client.clone(), dir.path()).unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(summary.retries, 0);
    assert_eq!(summary.failed, 1);
}

#[test]
fn retry_succeeds_on_second_attempt() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();
    let client = ScriptedClient::script(&["garbage"], GOOD_REPLY);

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.succeeded, 1);
}

#[test]
fn keywords_rejected_by_normalization_count_as_missing() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();
    let client = ScriptedClient::always(r#"{"Keywords": ["photography", "x y z w"]}"#);

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 2);
    assert_eq!(summary.failed, 1);
}

#[test]
fn failed_files_are_reprocessed_only_on_request() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();
    harness
        .run(TaggerConfig::default(), ScriptedClient::always("{}"), dir.path())
        .unwrap();

    let idle = ScriptedClient::always(GOOD_REPLY);
    harness
        .run(TaggerConfig::default(), idle.clone(), dir.path())
        .unwrap();
    assert_eq!(idle.calls(), 0);

    let config = TaggerConfig {
        reprocess_failed: true,
        ..TaggerConfig::default()
    };
    let summary = harness
        .run(config, ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    let record = harness.gateway.record(&dir.path().join("a.png")).unwrap();
    assert_eq!(record.status, Some(Status::Success));
}

#[test]
fn dry_run_reports_the_same_results_without_writing() {
    let dir = library(&["a.png", "b.png"]);
    let dry = Harness::new();
    let config = TaggerConfig {
        dry_run: true,
        ..TaggerConfig::default()
    };

    let summary = dry
        .run(config, ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(dry.gateway.writes(), 0);
    assert_eq!(dry.gateway.store.lock().unwrap().dry_writes, 2);
    assert!(dry.gateway.record(&dir.path().join("a.png")).is_none());

    let wet = Harness::new();
    let wet_summary = wet
        .run(TaggerConfig::default(), ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();
    assert_eq!(wet_summary, summary);
    assert_eq!(wet.image_events().len(), dry.image_events().len());
}

#[test]
fn orphans_are_marked_successful_without_generation() {
    let dir = library(&["a.png"]);
    let path = dir.path().join("a.png");
    let harness = Harness::new();
    let id = FileId::generate();
    harness.gateway.insert(
        CanonicalRecord::new(&path)
            .with_identifier(id.clone())
            .with_keywords(["tree"]),
    );
    let client = ScriptedClient::always(GOOD_REPLY);

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 0);
    assert_eq!(summary.orphans_repaired, 1);
    let record = harness.gateway.record(&path).unwrap();
    assert_eq!(record.status, Some(Status::Success));
    assert_eq!(record.identifier, Some(id));
    assert_eq!(record.keywords.len(), 1);
}

#[test]
fn orphan_under_full_reprocess_ends_with_the_generation_status() {
    let dir = library(&["a.png", "b.png"]);
    let harness = Harness::new();
    for name in ["a.png", "b.png"] {
        harness.gateway.insert(
            CanonicalRecord::new(dir.path().join(name))
                .with_identifier(FileId::generate())
                .with_keywords(["tree"]),
        );
    }
    let empty = r#"{"Description": "Nothing.", "Keywords": []}"#;
    // a.png is handled first and gets keywords; b.png never does
    let client = ScriptedClient::script(&[GOOD_REPLY], empty);
    let config = TaggerConfig {
        reprocess_all: true,
        ..TaggerConfig::default()
    };

    let summary = harness.run(config, client.clone(), dir.path()).unwrap();

    assert_eq!(summary.orphans_repaired, 0);
    assert_eq!(client.calls(), 3);
    assert_eq!(harness.gateway.writes(), 2);
    let tagged = harness.gateway.record(&dir.path().join("a.png")).unwrap();
    assert_eq!(tagged.status, Some(Status::Success));
    assert!(tagged.keywords.contains("cat"));
    let failed = harness.gateway.record(&dir.path().join("b.png")).unwrap();
    assert_eq!(failed.status, Some(Status::Failed));
}

#[test]
fn existing_identifier_is_never_replaced() {
    let dir = library(&["a.png"]);
    let path = dir.path().join("a.png");
    let harness = Harness::new();
    let id = FileId::new("fixed-id");
    harness.gateway.insert(
        CanonicalRecord::new(&path)
            .with_identifier(id.clone())
            .with_status(Status::Retry),
    );

    harness
        .run(TaggerConfig::default(), ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();

    let record = harness.gateway.record(&path).unwrap();
    assert_eq!(record.identifier, Some(id));
    assert_eq!(record.status, Some(Status::Success));
}

#[test]
fn update_keywords_merges_with_existing() {
    let dir = library(&["a.png"]);
    let path = dir.path().join("a.png");
    let harness = Harness::new();
    harness.gateway.insert(
        CanonicalRecord::new(&path)
            .with_identifier(FileId::generate())
            .with_status(Status::Success)
            .with_keywords(["Old Trees"]),
    );
    let config = TaggerConfig {
        reprocess_all: true,
        update_keywords: true,
        ..TaggerConfig::default()
    };

    harness
        .run(config, ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();

    let record = harness.gateway.record(&path).unwrap();
    let keywords: Vec<&str> = record.keywords.iter().map(String::as_str).collect();
    assert_eq!(keywords, vec!["blue sky", "cat", "old tree"]);
}

#[test]
fn existing_description_is_kept_unless_updating() {
    let dir = library(&["a.png"]);
    let path = dir.path().join("a.png");
    let harness = Harness::new();
    harness.gateway.insert(
        CanonicalRecord::new(&path)
            .with_identifier(FileId::generate())
            .with_description("Holiday snap."),
    );
    let config = TaggerConfig {
        update_caption: true,
        ..TaggerConfig::default()
    };

    harness
        .run(config, ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();

    let record = harness.gateway.record(&path).unwrap();
    assert_eq!(
        record.description.as_deref(),
        Some("Holiday snap.<generated>A small square.</generated>")
    );
}

#[test]
fn files_failing_validation_are_skipped() {
    let dir = library(&["bad.png", "good.png"]);
    let harness = Harness::new();
    harness
        .gateway
        .store
        .lock()
        .unwrap()
        .invalid
        .push(dir.path().join("bad.png"));
    let client = ScriptedClient::always(GOOD_REPLY);

    let summary = harness
        .run(TaggerConfig::default(), client.clone(), dir.path())
        .unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(summary.skipped, 1);
    assert!(harness.gateway.record(&dir.path().join("bad.png")).is_none());
}

#[test]
fn undecodable_images_are_left_for_a_later_run() {
    let dir = library(&["good.png"]);
    std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
    let harness = Harness::new();

    let summary = harness
        .run(TaggerConfig::default(), ScriptedClient::always(GOOD_REPLY), dir.path())
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert!(harness.gateway.record(&dir.path().join("broken.jpg")).is_none());
}

#[test]
fn stop_request_ends_run_before_any_work() {
    let dir = library(&["a.png"]);
    let gateway = MemoryGateway::default();
    let client = ScriptedClient::always(GOOD_REPLY);

    let summary = PipelineBuilder::new(TaggerConfig::default())
        .gateway(Box::new(gateway.clone()))
        .generator(CaptionGeneratorBuilder::new().client(client.clone()).build())
        .control(Box::new(|| RunState::Stopped))
        .build()
        .run(dir.path())
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(client.calls(), 0);
    assert_eq!(gateway.store.lock().unwrap().shutdowns, 1);
}

#[test]
fn missing_root_is_a_crawler_error() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();

    let err = harness
        .run(
            TaggerConfig::default(),
            ScriptedClient::always(GOOD_REPLY),
            &dir.path().join("missing"),
        )
        .unwrap_err();

    assert!(matches!(err, PipelineError::Crawler { .. }));
    assert_eq!(harness.gateway.store.lock().unwrap().shutdowns, 1);
}

/// Fails like a downed endpoint for the first `outage` calls, then answers
/// from the scripted client.
struct FlakyClient {
    down: LlmClient,
    outage: Mutex<usize>,
    up: Arc<ScriptedClient>,
}

impl LlmClientTrait for FlakyClient {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        {
            let mut outage = self.outage.lock().unwrap();
            if *outage > 0 {
                *outage -= 1;
                return self.down.complete(request);
            }
        }
        self.up.complete(request)
    }
}

fn unreachable_client() -> LlmClient {
    // nothing listens on port 9 of the loopback interface
    LlmClientBuilder::new()
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap()
}

#[test]
fn unreachable_endpoint_marks_file_failed_and_ends_in_error() {
    let dir = library(&["a.png"]);
    let harness = Harness::new();

    let err = harness
        .run(TaggerConfig::default(), Arc::new(unreachable_client()), dir.path())
        .unwrap_err();

    assert!(matches!(err, PipelineError::EndpointUnreachable { calls: 2 }));
    let record = harness.gateway.record(&dir.path().join("a.png")).unwrap();
    assert_eq!(record.status, Some(Status::Failed));
    assert!(record.identifier.is_some());
    assert_eq!(harness.gateway.writes(), 1);
}

#[test]
fn short_outage_does_not_abort_the_run() {
    let dir = library(&["a.png", "b.png", "c.png", "d.png"]);
    let harness = Harness::new();
    let up = ScriptedClient::always(GOOD_REPLY);
    let client = FlakyClient {
        down: unreachable_client(),
        outage: Mutex::new(3),
        up: up.clone(),
    };

    let summary = harness
        .run(TaggerConfig::default(), Arc::new(client), dir.path())
        .unwrap();

    assert_eq!(summary.unreachable_calls, 3);
    assert_eq!(summary.generation_calls, 3 + up.calls() as u32);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(harness.gateway.writes(), 4);
}

#[test]
fn stop_request_mid_batch_finishes_the_current_file_only() {
    let dir = library(&["a.png", "b.png", "c.png"]);
    let gateway = MemoryGateway::default();
    let client = ScriptedClient::always(GOOD_REPLY);
    let seen = client.clone();

    let summary = PipelineBuilder::new(TaggerConfig::default())
        .gateway(Box::new(gateway.clone()))
        .generator(CaptionGeneratorBuilder::new().client(client.clone()).build())
        .control(Box::new(move || {
            if seen.calls() >= 1 {
                RunState::Stopped
            } else {
                RunState::Running
            }
        }))
        .build()
        .run(dir.path())
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(client.calls(), 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(gateway.writes(), 1);
    assert_eq!(gateway.store.lock().unwrap().shutdowns, 1);
}

#[test]
fn paused_run_resumes_and_processes_every_file() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let dir = library(&["a.png", "b.png", "c.png"]);
    let gateway = MemoryGateway::default();
    let client = ScriptedClient::always(GOOD_REPLY);
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&polls);

    let summary = PipelineBuilder::new(TaggerConfig::default())
        .gateway(Box::new(gateway.clone()))
        .generator(CaptionGeneratorBuilder::new().client(client.clone()).build())
        .control(Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                RunState::Paused
            } else {
                RunState::Running
            }
        }))
        .build()
        .run(dir.path())
        .unwrap();

    assert!(polls.load(Ordering::SeqCst) > 3);
    assert!(!summary.stopped);
    assert_eq!(client.calls(), 3);
    assert_eq!(summary.succeeded, 3);
    for name in ["a.png", "b.png", "c.png"] {
        let record = gateway.record(&dir.path().join(name)).unwrap();
        assert_eq!(record.status, Some(Status::Success));
    }
}
