//! Everything between a forum thread and a typed [`AnalysisResult`]:
//! prompt construction, the hosted model call, and the extraction and
//! normalization of whatever text the model sends back.
//!
//! [`AnalysisResult`]: analyzer_core::AnalysisResult

pub mod anthropic;
pub mod extract;
pub mod normalize;
pub mod prompt;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use extract::{extract_json, ExtractionError};
pub use normalize::{AnalysisOutcome, Normalizer};
pub use prompt::PromptBuilder;
pub use provider::{GenerationParams, Message, ModelProvider, ModelRequest, ModelResponse, Role};
