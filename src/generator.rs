//! Caption and keyword generation.
//!
//! The [`CaptionGenerator`] sends one prepared image per call to the
//! inference endpoint and turns the raw reply into a [`GenerationResult`]
//! through the tolerant extraction chain in [`extract`].

pub mod extract;
mod prompt;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CaptionMode;
use crate::llm::{ChatRequest, LlmClientTrait, LlmError, SamplingParams};

pub use extract::{GenerationResult, clean_caption, extract_result};
pub use prompt::{
    CAPTION_INSTRUCTION, COMBINED_INSTRUCTION, Instructions, KEYWORDS_INSTRUCTION,
    SYSTEM_INSTRUCTION,
};

/// What a single generation call asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationTask {
    /// Plain-text description only.
    Caption,
    /// JSON object with a keyword list.
    Keywords,
    /// JSON object with a description and a keyword list.
    CaptionAndKeywords,
}

/// Outcome of one mode-level generation for a single image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationAttempt {
    /// Parsed output, `None` when nothing usable came back.
    pub result: Option<GenerationResult>,
    /// Number of requests sent to the endpoint.
    pub calls: u32,
    /// Number of requests that failed to reach the endpoint.
    pub unreachable: u32,
}

impl GenerationAttempt {
    /// True when the attempt produced at least one keyword.
    pub fn has_keywords(&self) -> bool {
        self.result.as_ref().is_some_and(GenerationResult::has_keywords)
    }
}

/// Builder for constructing `CaptionGenerator` instances.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use phototag::generator::CaptionGeneratorBuilder;
/// use phototag::llm::LlmClientBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = LlmClientBuilder::new()
///     .base_url("http://localhost:5001")
///     .build()?;
///
/// let generator = CaptionGeneratorBuilder::new()
///     .client(Arc::new(client))
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct CaptionGeneratorBuilder {
    client: Option<Arc<dyn LlmClientTrait>>,
    instructions: Option<Instructions>,
    params: Option<SamplingParams>,
}

impl CaptionGeneratorBuilder {
    /// Creates a new `CaptionGeneratorBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint client.
    pub fn client(mut self, client: Arc<dyn LlmClientTrait>) -> Self {
        self.client = Some(client);
        self
    }

    /// Overrides the built-in instruction texts.
    pub fn instructions(mut self, instructions: Instructions) -> Self {
        self.instructions = Some(instructions);
        self
    }

    /// Sets the sampling parameters sent with every request.
    pub fn params(mut self, params: SamplingParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Builds the `CaptionGenerator`.
    ///
    /// # Panics
    ///
    /// Panics if `client()` was not called before `build()`.
    #[must_use]
    pub fn build(self) -> CaptionGenerator {
        CaptionGenerator {
            client: self.client.expect("client must be set via client() method"),
            instructions: self.instructions.unwrap_or_default(),
            params: self.params.unwrap_or_default(),
        }
    }
}

/// Generates descriptions and keywords for prepared images.
pub struct CaptionGenerator {
    client: Arc<dyn LlmClientTrait>,
    instructions: Instructions,
    params: SamplingParams,
}

impl CaptionGenerator {
    /// Creates a generator with default instructions and sampling.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClientTrait>) -> Self {
        CaptionGeneratorBuilder::new().client(client).build()
    }

    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    pub fn params(&self) -> SamplingParams {
        self.params
    }

    /// Sends one request for `task` and returns the raw model text.
    ///
    /// # Errors
    ///
    /// Returns the client's [`LlmError`] unchanged.
    pub fn generate(&self, task: GenerationTask, image_jpeg: &[u8]) -> Result<String, LlmError> {
        let instruction = match task {
            GenerationTask::Caption => &self.instructions.caption,
            GenerationTask::Keywords => &self.instructions.keywords,
            GenerationTask::CaptionAndKeywords => &self.instructions.combined,
        };

        let request = ChatRequest {
            system: &self.instructions.system,
            instruction,
            image_jpeg,
            params: self.params,
        };

        self.client.complete(&request)
    }

    /// Runs the calls needed for `mode` and parses the replies.
    ///
    /// * `Short` sends one combined request.
    /// * `Detailed` sends a keywords request and, when it yields keywords, a
    ///   separate caption request whose cleaned text becomes the description.
    /// * `None` sends a keywords request and never produces a description.
    ///
    /// Transport failures are logged and counted; they never propagate.
    pub fn run(&self, mode: CaptionMode, image_jpeg: &[u8]) -> GenerationAttempt {
        let mut attempt = GenerationAttempt::default();

        match mode {
            CaptionMode::Short => {
                attempt.result = self
                    .call(&mut attempt, GenerationTask::CaptionAndKeywords, image_jpeg)
                    .and_then(|raw| extract_result(&raw));
            }
            CaptionMode::None => {
                attempt.result = self
                    .call(&mut attempt, GenerationTask::Keywords, image_jpeg)
                    .and_then(|raw| extract_result(&raw))
                    .map(|result| GenerationResult {
                        description: None,
                        ..result
                    });
            }
            CaptionMode::Detailed => {
                let keywords = self
                    .call(&mut attempt, GenerationTask::Keywords, image_jpeg)
                    .and_then(|raw| extract_result(&raw));

                attempt.result = match keywords {
                    Some(result) if result.has_keywords() => {
                        let caption = self
                            .call(&mut attempt, GenerationTask::Caption, image_jpeg)
                            .and_then(|raw| clean_caption(&raw));
                        Some(GenerationResult {
                            description: caption.or(result.description),
                            keywords: result.keywords,
                        })
                    }
                    other => other,
                };
            }
        }

        attempt
    }

    fn call(
        &self,
        attempt: &mut GenerationAttempt,
        task: GenerationTask,
        image_jpeg: &[u8],
    ) -> Option<String> {
        attempt.calls += 1;
        match self.generate(task, image_jpeg) {
            Ok(raw) => {
                debug!(?task, chars = raw.len(), "generation call returned");
                Some(raw)
            }
            Err(e) => {
                if e.is_unreachable() {
                    attempt.unreachable += 1;
                }
                warn!(?task, error = %e, "generation call failed");
                None
            }
        }
    }
}
