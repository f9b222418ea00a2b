//! Domain and API models.
//!
//! Defines the code-mapping types that flow through the pipeline and the JSON
//! request/response structures for the HTTP adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The terminology a phrase is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    /// RxNorm.
    Medication,
    /// ICD-10-CM.
    Condition,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Medication => "medication",
            CodeType::Condition => "condition",
        }
    }

    /// Medication candidates are only usable with a provider score.
    pub fn requires_score(&self) -> bool {
        matches!(self, CodeType::Medication)
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medication" => Ok(CodeType::Medication),
            "condition" => Ok(CodeType::Condition),
            other => Err(format!("Unknown example type: {}", other)),
        }
    }
}

/// Where a verified mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleSource {
    Manual,
    RxnavApi,
    Icd10Api,
    EnhancedLlm,
}

impl ExampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleSource::Manual => "manual",
            ExampleSource::RxnavApi => "rxnav_api",
            ExampleSource::Icd10Api => "icd10_api",
            ExampleSource::EnhancedLlm => "enhanced_llm",
        }
    }

    /// Source recorded for mappings learned from a terminology provider.
    pub fn for_provider(code_type: CodeType) -> Self {
        match code_type {
            CodeType::Medication => ExampleSource::RxnavApi,
            CodeType::Condition => ExampleSource::Icd10Api,
        }
    }
}

/// A verified text to code mapping. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeExample {
    pub text: String,
    pub code: String,
    pub description: String,
    pub code_type: CodeType,
    pub source: ExampleSource,
    pub confidence: f64,
}

impl CodeExample {
    /// A hand-curated mapping with full confidence.
    pub fn manual(
        text: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        code_type: CodeType,
    ) -> Self {
        Self {
            text: text.into(),
            code: code.into(),
            description: description.into(),
            code_type,
            source: ExampleSource::Manual,
            confidence: 1.0,
        }
    }
}

/// A filtered, ranked terminology candidate. Lives for one request only.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identifier: String,
    pub name: String,
    pub score: Option<f64>,
    pub rank: u32,
    pub source: String,
}

/// Terminal output of a resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalCodeResult {
    pub code: Option<String>,
    pub description: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub additional_info: Map<String, Value>,
}

impl MedicalCodeResult {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        confidence: Option<f64>,
    ) -> Self {
        Self {
            code: Some(code.into()),
            description: Some(description.into()),
            confidence,
            additional_info: Map::new(),
        }
    }

    /// The null-field shape returned when a condition search has zero rows.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_info(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.additional_info.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of one resolution call.
///
/// `Resolved` may carry [`MedicalCodeResult::empty`]; callers must treat that
/// and `NoMatch` as two distinct "no result" shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(MedicalCodeResult),
    NoMatch,
}

impl Resolution {
    pub fn result(&self) -> Option<&MedicalCodeResult> {
        match self {
            Resolution::Resolved(result) => Some(result),
            Resolution::NoMatch => None,
        }
    }

    pub fn into_result(self) -> Option<MedicalCodeResult> {
        match self {
            Resolution::Resolved(result) => Some(result),
            Resolution::NoMatch => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.result().and_then(|r| r.code.as_deref())
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Resolution::NoMatch)
    }
}

/// Request to resolve a single phrase via API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// The free-text phrase.
    pub text: String,
}

/// Request to resolve several phrases of one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResolveRequest {
    pub code_type: CodeType,
    pub texts: Vec<String>,
}

/// Response for a single resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    /// "resolved" or "no_match".
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MedicalCodeResult>,
}

impl From<Resolution> for ResolveResponse {
    fn from(resolution: Resolution) -> Self {
        let status = if resolution.is_no_match() {
            "no_match"
        } else {
            "resolved"
        };
        Self {
            status: status.to_string(),
            result: resolution.into_result(),
        }
    }
}

/// Response for batch resolution, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResolveResponse {
    pub results: Vec<ResolveResponse>,
    pub count: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub completion_model: String,
    pub embedding_model: String,
    pub medication_examples: usize,
    pub condition_examples: usize,
    /// Entries in the completion cache, if one is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_entries: Option<usize>,
    pub endpoints: Vec<String>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
