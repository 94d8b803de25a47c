//! Keyword normalization for model-generated tags.
//!
//! Models return keywords in whatever shape they like: title case,
//! camel-cased compounds, plurals, punctuation, phrases echoed back from the
//! instruction. Everything written to metadata passes through
//! [`KeywordNormalizer`] first, and the resulting strings are the identity
//! used for deduplication.

mod inflect;
mod normalizer;
mod vocabulary;

pub use inflect::depluralize;
pub use normalizer::{KeywordNormalizer, NormalizerConfig, normalize_keyword};
pub use vocabulary::{AND_EXCEPTIONS, DEFAULT_BANNED_WORDS};
