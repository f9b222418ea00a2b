//! Resolution orchestrator.
//!
//! Runs one phrase through normalization, the example short circuit,
//! terminology lookup, LLM arbitration or fallback, and the confidence gate
//! that feeds the example store. Stages run strictly in sequence and never
//! loop; every external failure degrades the current request only.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::{ClinicalTablesClient, OpenAiClient, RxNavClient};
use crate::config::{Config, ResolverSettings};
use crate::error::{ResolveError, Result};
use crate::models::{
    Candidate, CodeExample, CodeType, ExampleSource, MedicalCodeResult, Resolution,
};
use crate::services::candidates::{
    format_candidates, normalize_score, parse_selection, rank_candidates,
};
use crate::services::example_store::AddOutcome;
use crate::services::{
    prompts, CacheBackend, CompletionCache, ExampleStore, FileCacheBackend, InMemoryCacheBackend,
    LlmService,
};
use crate::traits::{CompletionRequest, ResponseFormat, TerminologyClient};

const NOT_APPLICABLE: &str = "N/A";

/// What the terminology stage produced.
enum CandidateLookup {
    Candidates(Vec<Candidate>),
    /// The provider answered with zero rows.
    ZeroRows,
    /// Transport or payload failure, or every row was filtered out.
    Unusable,
}

/// Structured answer of the fallback stage.
#[derive(Debug, PartialEq)]
struct FallbackAnswer {
    code: Option<String>,
    description: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

/// The top-level resolution pipeline.
pub struct ResolutionOrchestrator {
    settings: ResolverSettings,
    llm: LlmService,
    examples: Arc<ExampleStore>,
    medications: Arc<dyn TerminologyClient>,
    conditions: Arc<dyn TerminologyClient>,
}

impl ResolutionOrchestrator {
    pub fn new(
        settings: ResolverSettings,
        llm: LlmService,
        examples: Arc<ExampleStore>,
        medications: Arc<dyn TerminologyClient>,
        conditions: Arc<dyn TerminologyClient>,
    ) -> Self {
        Self {
            settings,
            llm,
            examples,
            medications,
            conditions,
        }
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// Fails only with [`ResolveError::Configuration`].
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| ResolveError::Configuration("OPENAI_API_KEY missing".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ResolveError::Configuration(format!("HTTP client: {}", e)))?;

        let openai = Arc::new(
            OpenAiClient::new(api_key)
                .with_base_url(config.openai_base_url.clone())
                .with_embedding_model(config.embedding_model.clone(), config.embedding_dimension)
                .with_http_client(http.clone()),
        );

        let mut llm = LlmService::new(openai.clone());
        if config.completion_cache_enabled {
            let backend: Arc<dyn CacheBackend> = match &config.completion_cache_path {
                Some(path) => {
                    let file = FileCacheBackend::open(path).map_err(|e| {
                        ResolveError::Configuration(format!("completion cache: {:#}", e))
                    })?;
                    info!("Completion cache persisted at {}", file.path().display());
                    Arc::new(file)
                }
                None => Arc::new(InMemoryCacheBackend::new()),
            };
            llm = llm.with_cache(CompletionCache::new(
                backend,
                config.cache_schema_version.clone(),
            ));
        }

        let mut store =
            ExampleStore::new(openai).with_capacity_per_type(config.max_examples_per_type);
        if let Some(path) = &config.example_snapshot_path {
            store = store.with_snapshot_path(path.clone());
        }

        let medications = Arc::new(
            RxNavClient::new(config.rxnav_base_url.clone()).with_http_client(http.clone()),
        );
        let conditions = Arc::new(
            ClinicalTablesClient::new(config.icd10_base_url.clone()).with_http_client(http),
        );

        Ok(Self::new(
            config.resolver_settings(),
            llm,
            Arc::new(store),
            medications,
            conditions,
        ))
    }

    pub fn example_store(&self) -> &Arc<ExampleStore> {
        &self.examples
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve a medication mention to an RxNorm code.
    pub async fn resolve_medication(&self, free_text: &str) -> Resolution {
        self.resolve(free_text, CodeType::Medication).await
    }

    /// Resolve a condition name to an ICD-10 code.
    pub async fn resolve_condition(&self, name: &str) -> Resolution {
        self.resolve(name, CodeType::Condition).await
    }

    /// Resolve independent phrases concurrently, at most `max_concurrency`
    /// at a time; output follows input order.
    pub async fn resolve_many(&self, texts: &[String], code_type: CodeType) -> Vec<Resolution> {
        let futures: Vec<_> = texts
            .iter()
            .map(|text| self.resolve(text, code_type))
            .collect();
        stream::iter(futures)
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Run the full pipeline for one phrase.
    pub async fn resolve(&self, text: &str, code_type: CodeType) -> Resolution {
        let original = text.trim();
        if original.is_empty() {
            debug!("Empty {} text, nothing to resolve", code_type);
            return Resolution::NoMatch;
        }

        let query = match code_type {
            CodeType::Medication => self.normalize_medication(original).await,
            CodeType::Condition => original.to_lowercase(),
        };

        let similar = self
            .examples
            .query(&query, code_type, self.settings.example_top_k)
            .await;

        if let Some(result) = self.exact_example(&query, &similar, original) {
            return Resolution::Resolved(result);
        }

        match self.lookup_candidates(&query, code_type).await {
            CandidateLookup::Candidates(candidates) => {
                self.arbitrate(&query, original, code_type, candidates, &similar)
                    .await
            }
            CandidateLookup::ZeroRows if code_type == CodeType::Condition => {
                debug!("No ICD-10 results found for {:?}", query);
                Resolution::Resolved(MedicalCodeResult::empty())
            }
            CandidateLookup::ZeroRows | CandidateLookup::Unusable => {
                debug!("No usable candidates for {:?}, trying enhanced lookup", query);
                self.fallback(&query, original, code_type, &similar).await
            }
        }
    }

    /// Stage A: strip frequency and instructions, keep dose, form and strength.
    async fn normalize_medication(&self, free_text: &str) -> String {
        info!("Extracting drug name from text: {}", free_text);
        let request = CompletionRequest::new(
            prompts::NORMALIZE_MEDICATION_SYSTEM,
            prompts::normalize_medication_user(free_text),
            self.settings.model.clone(),
            self.settings.temperature,
        );

        match self.llm.complete(&request).await {
            Ok(content) => {
                let extracted = content.trim().trim_matches('"').trim().to_lowercase();
                if extracted.is_empty() {
                    warn!("Empty medication extraction, using raw text");
                    free_text.to_lowercase()
                } else {
                    info!("Extracted drug text: {}", extracted);
                    extracted
                }
            }
            Err(e) => {
                warn!("Error extracting drug name, using raw text: {}", e);
                free_text.to_lowercase()
            }
        }
    }

    /// Stage B: a confident example with the very same text wins outright.
    fn exact_example(
        &self,
        query: &str,
        similar: &[CodeExample],
        original: &str,
    ) -> Option<MedicalCodeResult> {
        let example = similar.iter().find(|e| {
            e.text.to_lowercase() == query.to_lowercase()
                && e.confidence > self.settings.exact_match_threshold
        })?;

        info!(
            "Found exact match in examples: {} - {}",
            example.code, example.description
        );
        Some(
            MedicalCodeResult::new(&example.code, &example.description, Some(example.confidence))
                .with_info("source", "example_store")
                .with_info("original_query", original),
        )
    }

    /// Stage C: fetch, filter and order terminology candidates.
    async fn lookup_candidates(&self, query: &str, code_type: CodeType) -> CandidateLookup {
        let client = match code_type {
            CodeType::Medication => &self.medications,
            CodeType::Condition => &self.conditions,
        };

        let raw = match client.search(query, self.settings.max_candidates).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{} lookup failed for {:?}: {}", client.provider_name(), query, e);
                return CandidateLookup::Unusable;
            }
        };
        if raw.is_empty() {
            return CandidateLookup::ZeroRows;
        }

        let candidates = rank_candidates(raw, code_type);
        if candidates.is_empty() {
            debug!("No valid candidates found after processing");
            return CandidateLookup::Unusable;
        }
        CandidateLookup::Candidates(candidates)
    }

    /// Stages D and E: let the LLM pick a candidate, then gate it.
    async fn arbitrate(
        &self,
        query: &str,
        original: &str,
        code_type: CodeType,
        candidates: Vec<Candidate>,
        similar: &[CodeExample],
    ) -> Resolution {
        let listing = format_candidates(&candidates, code_type);
        debug!("Presenting {} candidates to LLM:\n{}", candidates.len(), listing);

        let examples = if similar.is_empty() {
            String::new()
        } else {
            ExampleStore::format_for_prompt(similar)
        };
        let request = CompletionRequest::new(
            prompts::arbitration_system(code_type, &examples, candidates.len()),
            prompts::arbitration_user(code_type, query, &listing, candidates.len()),
            self.settings.model.clone(),
            self.settings.temperature,
        );

        let selection = match self.llm.complete(&request).await {
            Ok(content) => parse_selection(&content, candidates.len()),
            Err(e) => Err(e),
        };
        let index = match selection {
            Ok(Some(index)) => index,
            Ok(None) => {
                debug!("LLM rejected all matches or selected invalid index");
                return Resolution::NoMatch;
            }
            Err(e) => {
                warn!("Arbitration failed for {:?}: {}", query, e);
                return Resolution::NoMatch;
            }
        };

        let Some(selected) = candidates.into_iter().nth(index) else {
            return Resolution::NoMatch;
        };
        debug!(
            "Selected candidate: {} id: {} (score: {:?}, rank: {}, source: {})",
            selected.name, selected.identifier, selected.score, selected.rank, selected.source
        );

        let source = ExampleSource::for_provider(code_type);
        let result = MedicalCodeResult::new(
            selected.identifier,
            selected.name.to_lowercase(),
            selected.score.map(normalize_score),
        )
        .with_info("source", source.as_str())
        .with_info("terminology_source", selected.source)
        .with_info("rank", selected.rank)
        .with_info("original_query", original);

        self.learn(query, code_type, &result, source).await;
        Resolution::Resolved(result)
    }

    /// Stage F: ask the LLM for a code directly when no candidates exist.
    async fn fallback(
        &self,
        query: &str,
        original: &str,
        code_type: CodeType,
        similar: &[CodeExample],
    ) -> Resolution {
        let request = CompletionRequest::new(
            prompts::fallback_system(code_type, &ExampleStore::format_for_prompt(similar)),
            prompts::fallback_user(code_type, query),
            self.settings.model.clone(),
            self.settings.temperature,
        )
        .with_response_format(ResponseFormat::JsonObject);

        let answer = match self.llm.complete(&request).await.and_then(|c| parse_fallback(&c)) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Error in enhanced code lookup for {:?}: {}", query, e);
                return Resolution::NoMatch;
            }
        };

        let Some(code) = answer
            .code
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(NOT_APPLICABLE))
        else {
            debug!("Enhanced lookup found no code for {:?}", query);
            return Resolution::NoMatch;
        };

        let mut result = MedicalCodeResult {
            code: Some(code),
            description: answer.description,
            confidence: answer.confidence.map(|c| c.clamp(0.0, 1.0)),
            additional_info: Default::default(),
        }
        .with_info("source", ExampleSource::EnhancedLlm.as_str())
        .with_info("original_query", original);
        if let Some(reasoning) = answer.reasoning {
            result = result.with_info("reasoning", reasoning);
        }

        self.learn(query, code_type, &result, ExampleSource::EnhancedLlm)
            .await;
        Resolution::Resolved(result)
    }

    /// Stage E: persist results whose confidence clears the threshold.
    async fn learn(
        &self,
        text: &str,
        code_type: CodeType,
        result: &MedicalCodeResult,
        source: ExampleSource,
    ) -> bool {
        let Some(confidence) = result.confidence else {
            return false;
        };
        if !confidence.is_finite() || confidence <= self.settings.persist_threshold {
            debug!(
                "Confidence {:.2} not above {:.2}, not learning {:?}",
                confidence, self.settings.persist_threshold, text
            );
            return false;
        }
        let Some(code) = result.code.clone() else {
            return false;
        };

        let outcome = self
            .examples
            .add(CodeExample {
                text: text.to_string(),
                code,
                description: result.description.clone().unwrap_or_default(),
                code_type,
                source,
                confidence,
            })
            .await;
        matches!(outcome, AddOutcome::Inserted(_))
    }
}

fn parse_fallback(content: &str) -> Result<FallbackAnswer> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| ResolveError::Parse(format!("malformed fallback JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ResolveError::Parse("fallback answer is not a JSON object".to_string()))?;

    let text_field = |key: &str| match object.get(key) {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite());

    Ok(FallbackAnswer {
        code: text_field("code"),
        description: text_field("description"),
        confidence,
        reasoning: text_field("reasoning"),
    })
}
