//! Deterministic collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::traits::{
    CompletionClient, CompletionRequest, EmbeddingClient, RawCandidate, TerminologyClient,
};

pub const TEST_DIMENSION: usize = 16;

/// Embeds text as a normalized byte histogram, so equal text (ignoring case)
/// always lands on the same vector.
pub struct FakeEmbedder {
    dimension: usize,
    failing: AtomicBool,
    pub calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: TEST_DIMENSION,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for b in text.to_lowercase().bytes() {
            v[b as usize % self.dimension] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("embedding service unavailable"));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}

/// Replays queued completions in order and records every request.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow!(message.to_string())));
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("LLM unavailable")))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Returns the same rows, or the same failure, for every search.
pub struct StaticTerminology {
    rows: std::result::Result<Vec<RawCandidate>, String>,
    pub calls: AtomicUsize,
}

impl StaticTerminology {
    pub fn rows(rows: Vec<RawCandidate>) -> Self {
        Self {
            rows: Ok(rows),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            rows: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminologyClient for StaticTerminology {
    async fn search(&self, _term: &str, max_entries: usize) -> Result<Vec<RawCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.rows {
            Ok(rows) => Ok(rows.iter().take(max_entries).cloned().collect()),
            Err(message) => Err(anyhow!(message.clone())),
        }
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

pub fn raw_candidate(identifier: &str, name: &str, score: f64, rank: u32) -> RawCandidate {
    RawCandidate {
        identifier: Some(identifier.to_string()),
        name: Some(name.to_string()),
        score: Some(score),
        rank: Some(rank),
        source: Some("RXNORM".to_string()),
    }
}
