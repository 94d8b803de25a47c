use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use phototag::generator::CaptionGeneratorBuilder;
use phototag::llm::{API_KEY_ENV, API_URL_ENV, LlmClientBuilder};
use phototag::metadata::{EXIFTOOL_ENV, ExifToolBuilder};
use phototag::pipeline::{ControlHandle, PipelineBuilder, PipelineError, TracingSink};
use phototag::{CaptionMode, TaggerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// phototag - describe and keyword images with a vision model
#[derive(Parser)]
#[command(name = "phototag")]
#[command(about = "Generate descriptions and keywords for images and store them in file metadata")]
#[command(version)]
struct Cli {
    /// Directory containing the images
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// URL of the OpenAI-compatible inference endpoint
    #[arg(long, env = API_URL_ENV, default_value = "http://localhost:5001")]
    api_url: String,

    /// Bearer credential for the endpoint
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Path to the exiftool executable
    #[arg(long, env = EXIFTOOL_ENV)]
    exiftool: Option<PathBuf>,

    /// Only process the top-level directory
    #[arg(long)]
    no_crawl: bool,

    /// Write in place without keeping an _original backup
    #[arg(long)]
    no_backup: bool,

    /// Run everything but do not modify any file
    #[arg(long)]
    dry_run: bool,

    /// Skip metadata validation before processing
    #[arg(long)]
    skip_verify: bool,

    /// Do not retry a file whose first attempt produced no keywords
    #[arg(long)]
    quick_fail: bool,

    /// Merge new keywords with existing ones
    #[arg(long)]
    update_keywords: bool,

    /// Append the generated description to an existing one
    #[arg(long)]
    update_caption: bool,

    /// Overwrite existing descriptions
    #[arg(long)]
    replace_caption: bool,

    /// Reprocess files marked as failed
    #[arg(long)]
    reprocess_failed: bool,

    /// Reprocess every file
    #[arg(long)]
    reprocess_all: bool,

    /// Leave orphaned files (keywords but no status) untouched
    #[arg(long)]
    no_fix_orphans: bool,

    /// How descriptions are generated
    #[arg(long, value_enum, default_value_t = CaptionArg::Short)]
    caption: CaptionArg,

    /// Maximum tokens per generation
    #[arg(long, default_value_t = 250)]
    max_tokens: u32,

    /// Longest image edge sent to the model, in pixels
    #[arg(long, default_value_t = 448)]
    res_limit: u32,

    /// Keep keywords exactly as the model returned them (trimmed only)
    #[arg(long)]
    no_normalize: bool,

    /// Maximum words per keyword
    #[arg(long, default_value_t = 2)]
    max_words: usize,

    /// Comma-separated words to reject in addition to the built-in list
    #[arg(long, value_name = "WORDS")]
    ban_words: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CaptionArg {
    /// Keywords only
    None,
    /// Description and keywords in one request
    Short,
    /// Separate keyword and description requests
    Detailed,
}

impl From<CaptionArg> for CaptionMode {
    fn from(arg: CaptionArg) -> Self {
        match arg {
            CaptionArg::None => CaptionMode::None,
            CaptionArg::Short => CaptionMode::Short,
            CaptionArg::Detailed => CaptionMode::Detailed,
        }
    }
}

fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phototag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are problems with the arguments, such as a directory that
/// does not exist.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.to_string().contains("is not a directory"))
}

fn run(cli: &Cli) -> Result<()> {
    ensure_directory(&cli.directory)?;
    let config = build_config(cli);

    let mut llm = LlmClientBuilder::new().base_url(&config.api_url);
    if let Some(key) = &config.api_key {
        llm = llm.api_key(key);
    }
    let client = llm.build().context("Failed to create inference client")?;
    let generator = CaptionGeneratorBuilder::new()
        .client(Arc::new(client))
        .instructions(config.instructions.clone())
        .params(config.sampling)
        .build();

    let mut exiftool = ExifToolBuilder::new();
    if let Some(path) = &config.exiftool {
        exiftool = exiftool.executable(path);
    }
    let gateway = exiftool.build().map_err(PipelineError::Gateway)?;

    let control = ControlHandle::new();
    let stopper = control.clone();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, stopping after the current file...");
        stopper.stop();
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut pipeline = PipelineBuilder::new(config)
        .gateway(Box::new(gateway))
        .generator(generator)
        .sink(Box::new(TracingSink))
        .control(Box::new(control))
        .build();

    let summary = pipeline.run(&cli.directory)?;
    info!(
        discovered = summary.discovered,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        orphans_repaired = summary.orphans_repaired,
        retries = summary.retries,
        generation_calls = summary.generation_calls,
        write_errors = summary.write_errors,
        stopped = summary.stopped,
        "summary"
    );
    Ok(())
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }
    Ok(())
}

fn build_config(cli: &Cli) -> TaggerConfig {
    let mut config = TaggerConfig {
        api_url: cli.api_url.clone(),
        api_key: cli.api_key.clone().filter(|k| !k.is_empty()),
        exiftool: cli.exiftool.clone(),
        recursive: !cli.no_crawl,
        backup: !cli.no_backup,
        dry_run: cli.dry_run,
        validate: !cli.skip_verify,
        quick_fail: cli.quick_fail,
        update_keywords: cli.update_keywords,
        update_caption: cli.update_caption,
        replace_caption: cli.replace_caption,
        reprocess_all: cli.reprocess_all,
        reprocess_failed: cli.reprocess_failed,
        repair_orphans: !cli.no_fix_orphans,
        caption_mode: cli.caption.into(),
        resolution_limit: cli.res_limit,
        ..TaggerConfig::default()
    };
    config.sampling.max_tokens = cli.max_tokens;
    config.normalizer.normalize_keywords = !cli.no_normalize;
    config.normalizer.max_words_per_keyword = cli.max_words;
    if let Some(words) = &cli.ban_words {
        config.banned_words.extend(parse_list(words));
    }
    config
}

/// Splits a comma-separated list, dropping empty entries.
fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
