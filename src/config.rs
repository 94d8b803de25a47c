//! Run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::generator::Instructions;
use crate::imaging::DEFAULT_RESOLUTION_LIMIT;
use crate::keywords::{DEFAULT_BANNED_WORDS, NormalizerConfig};
use crate::llm::SamplingParams;
use crate::metadata::WriteOptions;
use crate::status::StatusPolicy;

/// How descriptions are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionMode {
    /// Keywords only; existing descriptions are kept as they are.
    None,
    /// One combined request for description and keywords.
    #[default]
    Short,
    /// A keywords request plus a separate plain-text caption request.
    Detailed,
}

/// Every setting for a tagging run.
///
/// `Default` gives the settings of an unattended first run over a library:
/// recursive crawl, backups kept, validation on, orphan repair on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    /// Path to the exiftool executable; falls back to the environment.
    pub exiftool: Option<PathBuf>,

    /// Descend into subdirectories.
    pub recursive: bool,
    /// Keep the tool's `_original` backup when writing.
    pub backup: bool,
    /// Do everything except mutate files.
    pub dry_run: bool,
    /// Skip files whose metadata fails validation.
    pub validate: bool,
    /// Give up after the first attempt without keywords.
    pub quick_fail: bool,

    /// Merge new keywords with the file's existing ones.
    pub update_keywords: bool,
    /// Append the new description after an existing one.
    pub update_caption: bool,
    /// Overwrite an existing description.
    pub replace_caption: bool,

    pub reprocess_all: bool,
    pub reprocess_failed: bool,
    pub repair_orphans: bool,

    pub caption_mode: CaptionMode,
    /// Longest image edge sent to the model, in pixels.
    pub resolution_limit: u32,
    pub sampling: SamplingParams,
    pub instructions: Instructions,

    pub normalizer: NormalizerConfig,
    pub banned_words: Vec<String>,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            api_key: None,
            exiftool: None,
            recursive: true,
            backup: true,
            dry_run: false,
            validate: true,
            quick_fail: false,
            update_keywords: false,
            update_caption: false,
            replace_caption: false,
            reprocess_all: false,
            reprocess_failed: false,
            repair_orphans: true,
            caption_mode: CaptionMode::Short,
            resolution_limit: DEFAULT_RESOLUTION_LIMIT,
            sampling: SamplingParams::default(),
            instructions: Instructions::default(),
            normalizer: NormalizerConfig::default(),
            banned_words: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl TaggerConfig {
    pub fn status_policy(&self) -> StatusPolicy {
        StatusPolicy {
            reprocess_all: self.reprocess_all,
            reprocess_failed: self.reprocess_failed,
            repair_orphans: self.repair_orphans,
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            backup: self.backup,
            dry_run: self.dry_run,
        }
    }

    /// Number of generation attempts allowed per file.
    pub fn max_attempts(&self) -> u32 {
        if self.quick_fail { 1 } else { 2 }
    }

    /// Combines an existing description with a generated one.
    ///
    /// With no existing description the generated text is used. Otherwise
    /// `update_caption` appends it inside `<generated>` tags and
    /// `replace_caption` overwrites; with neither the existing text stays.
    pub fn compose_description(
        &self,
        existing: Option<&str>,
        generated: Option<&str>,
    ) -> Option<String> {
        if self.caption_mode == CaptionMode::None {
            return existing.map(str::to_string);
        }

        match (existing, generated) {
            (None, generated) => generated.map(str::to_string),
            (Some(existing), Some(generated)) if self.update_caption => {
                Some(format!("{existing}<generated>{generated}</generated>"))
            }
            (Some(_), Some(generated)) if self.replace_caption => Some(generated.to_string()),
            (Some(existing), _) => Some(existing.to_string()),
        }
    }
}
