//! Coercion of an untrusted parsed value into an [`AnalysisResult`].
//!
//! Every field is resolved independently against a closed set of accepted
//! shapes; anything else degrades to a fixed sentinel so that every stored
//! record has identical column types. Nothing here can fail.

use crate::extract::{extract_json, ExtractionError};
use analyzer_core::{
    AnalysisResult, Concept, ExplanationSchema, ProblemExplanation, StructuredExplanation,
};
use serde_json::{Map, Value};
use tracing::warn;

pub const MISSING_SUMMARY: &str = "N/A - Key missing or invalid type";
pub const MISSING_EXPLANATION: &str = "N/A - Explanation missing";
pub const MISSING_PROBLEM_EXPLANATION: &str = "N/A - Content missing";
pub const MISSING_CONCEPT_FIELD: &str = "N/A";
pub const MISSING_SOLUTION_EXPLANATION: &str = "N/A - Solution explanation missing or invalid type";
pub const MISSING_CATEGORIES: &str = "N/A - Invalid type or key missing";
pub const FAILED_ANALYSIS: &str = "Error: Model analysis or JSON parsing failed.";
pub const ERROR_CATEGORY: &str = "Error";
pub const MAX_SUGGESTED_CATEGORIES: usize = 3;

/// Older responses named the explanation text this way.
const LEGACY_EXPLANATION_KEY: &str = "relevance_to_problem";

/// The normalized result together with the extraction failure, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub failure: Option<ExtractionError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    schema: ExplanationSchema,
}

impl Normalizer {
    pub fn new(schema: ExplanationSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> ExplanationSchema {
        self.schema
    }

    /// Extracts and normalizes raw model output.
    pub fn analyze(&self, raw: &str) -> AnalysisOutcome {
        match extract_json(raw) {
            Ok(value) => AnalysisOutcome {
                result: self.normalize(&value),
                failure: None,
            },
            Err(failure) => {
                if let ExtractionError::MalformedJson { context, .. } = &failure {
                    warn!("JSON parse failed, context: {}", context);
                }
                AnalysisOutcome {
                    result: self.from_failure(&failure),
                    failure: Some(failure),
                }
            }
        }
    }

    pub fn normalize(&self, value: &Value) -> AnalysisResult {
        let empty = Map::new();
        let map = value.as_object().unwrap_or(&empty);

        AnalysisResult {
            problem_summary: summary(map.get("problem_summary")),
            problem_explanation: self.problem_explanation(map.get("problem_explanation")),
            solution_summary: summary(map.get("solution_summary")),
            solution_explanation: solution_explanation(map.get("solution_explanation")),
            suggested_categories: categories(map.get("suggested_categories")),
        }
    }

    /// The sentinel result for an extraction failure.
    pub fn from_failure(&self, failure: &ExtractionError) -> AnalysisResult {
        let (diagnostic, categories) = match failure {
            ExtractionError::EmptyResponse => (
                "Error: Model response did not contain expected text.".to_string(),
                vec![ERROR_CATEGORY.to_string(), failure.kind_label().to_string()],
            ),
            ExtractionError::NoJsonFound => (
                "Error: No JSON object found in model output.".to_string(),
                vec![ERROR_CATEGORY.to_string(), failure.kind_label().to_string()],
            ),
            ExtractionError::MalformedJson {
                offset, message, ..
            } => (
                format!("Fatal JSON parsing error at char {offset}: {message}"),
                vec![
                    ERROR_CATEGORY.to_string(),
                    failure.kind_label().to_string(),
                    message.clone(),
                ],
            ),
        };

        AnalysisResult {
            problem_summary: diagnostic.clone(),
            problem_explanation: match self.schema {
                ExplanationSchema::Structured => {
                    ProblemExplanation::Structured(StructuredExplanation {
                        primary_concepts: Vec::new(),
                        explanation: FAILED_ANALYSIS.to_string(),
                    })
                }
                ExplanationSchema::Text => ProblemExplanation::Text(FAILED_ANALYSIS.to_string()),
            },
            solution_summary: diagnostic,
            solution_explanation: FAILED_ANALYSIS.to_string(),
            suggested_categories: categories,
        }
    }

    fn problem_explanation(&self, value: Option<&Value>) -> ProblemExplanation {
        match self.schema {
            ExplanationSchema::Structured => {
                ProblemExplanation::Structured(structured_explanation(value))
            }
            ExplanationSchema::Text => ProblemExplanation::Text(text_explanation(value)),
        }
    }
}

/// Strings pass through; numbers and booleans are rendered; anything else
/// has no textual form.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn summary(value: Option<&Value>) -> String {
    scalar_text(value)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| MISSING_SUMMARY.to_string())
}

fn explanation_text(object: &Map<String, Value>) -> String {
    scalar_text(object.get("explanation"))
        .or_else(|| scalar_text(object.get(LEGACY_EXPLANATION_KEY)))
        .unwrap_or_else(|| MISSING_EXPLANATION.to_string())
}

fn structured_explanation(value: Option<&Value>) -> StructuredExplanation {
    let Some(Value::Object(object)) = value else {
        return StructuredExplanation {
            primary_concepts: Vec::new(),
            explanation: MISSING_PROBLEM_EXPLANATION.to_string(),
        };
    };

    let primary_concepts = match object.get("primary_concepts") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|concept| {
                let field = |key: &str| {
                    scalar_text(concept.get(key))
                        .unwrap_or_else(|| MISSING_CONCEPT_FIELD.to_string())
                };
                Concept {
                    name: field("name"),
                    definition: field("definition"),
                    use_case: field("use_case"),
                    how_it_functions: field("how_it_functions"),
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    StructuredExplanation {
        primary_concepts,
        explanation: explanation_text(object),
    }
}

fn text_explanation(value: Option<&Value>) -> String {
    match value {
        Some(Value::Object(object)) => explanation_text(object),
        other => scalar_text(other)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| MISSING_PROBLEM_EXPLANATION.to_string()),
    }
}

fn solution_explanation(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(nested @ Value::Object(_)) => {
            warn!("'solution_explanation' was an object, storing its JSON text");
            serde_json::to_string(nested).unwrap_or_else(|_| nested.to_string())
        }
        _ => MISSING_SOLUTION_EXPLANATION.to_string(),
    }
}

fn categories(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| scalar_text(Some(item)))
            .take(MAX_SUGGESTED_CATEGORIES)
            .collect(),
        _ => vec![MISSING_CATEGORIES.to_string()],
    }
}
