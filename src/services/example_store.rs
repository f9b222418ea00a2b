//! Embedding-indexed memory of verified code mappings.
//!
//! Each code type owns an arena of vectors with a parallel list of examples.
//! Position in the arena is the example's stable id; the corpus only grows.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{CodeExample, CodeType};
use crate::services::vector_ops::VectorOps;
use crate::traits::EmbeddingClient;

/// Stable position of an example within its type's index.
pub type ExampleId = usize;

const NO_EXAMPLES: &str = "No similar examples found.";

/// Result of [`ExampleStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(ExampleId),
    /// The same text already maps to the same code.
    Duplicate(ExampleId),
    /// Embedding failed, the confidence is not finite, or the index is at
    /// capacity; nothing was stored.
    Rejected,
}

/// Vectors and examples in positional correspondence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExampleIndex {
    vectors: Vec<Vec<f32>>,
    examples: Vec<CodeExample>,
}

impl ExampleIndex {
    fn len(&self) -> usize {
        self.examples.len()
    }

    fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Appends both halves of an entry together.
    fn push(&mut self, vector: Vec<f32>, example: CodeExample) -> ExampleId {
        self.vectors.push(vector);
        self.examples.push(example);
        debug_assert_eq!(self.vectors.len(), self.examples.len());
        self.examples.len() - 1
    }

    fn find(&self, text: &str, code: &str) -> Option<ExampleId> {
        self.examples
            .iter()
            .position(|e| e.code == code && e.text.eq_ignore_ascii_case(text))
    }

    fn is_consistent(&self, dimension: usize) -> bool {
        self.vectors.len() == self.examples.len()
            && self.vectors.iter().all(|v| v.len() == dimension)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Indices {
    medication: ExampleIndex,
    condition: ExampleIndex,
}

impl Indices {
    fn get(&self, code_type: CodeType) -> &ExampleIndex {
        match code_type {
            CodeType::Medication => &self.medication,
            CodeType::Condition => &self.condition,
        }
    }

    fn get_mut(&mut self, code_type: CodeType) -> &mut ExampleIndex {
        match code_type {
            CodeType::Medication => &mut self.medication,
            CodeType::Condition => &mut self.condition,
        }
    }

    fn is_empty(&self) -> bool {
        self.medication.is_empty() && self.condition.is_empty()
    }
}

/// On-disk form of the corpus.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    indices: Indices,
}

/// The built-in mappings loaded into an empty store.
pub fn seed_examples() -> Vec<CodeExample> {
    vec![
        CodeExample::manual(
            "lisinopril 10mg tablet daily",
            "314076",
            "Lisinopril 10 MG Oral Tablet",
            CodeType::Medication,
        ),
        CodeExample::manual(
            "metformin 500mg twice daily with meals",
            "861004",
            "Metformin Hydrochloride 500 MG",
            CodeType::Medication,
        ),
        CodeExample::manual(
            "atorvastatin 20mg daily at bedtime",
            "617318",
            "Atorvastatin 20 MG Oral Tablet",
            CodeType::Medication,
        ),
        CodeExample::manual(
            "amoxicillin 500mg capsule three times daily",
            "308182",
            "Amoxicillin 500 MG Oral Capsule",
            CodeType::Medication,
        ),
        CodeExample::manual(
            "type 2 diabetes mellitus",
            "E11.9",
            "Type 2 diabetes mellitus without complications",
            CodeType::Condition,
        ),
        CodeExample::manual(
            "essential hypertension",
            "I10",
            "Essential (primary) hypertension",
            CodeType::Condition,
        ),
        CodeExample::manual(
            "major depressive disorder",
            "F32.9",
            "Major depressive disorder, single episode, unspecified",
            CodeType::Condition,
        ),
        CodeExample::manual(
            "chronic obstructive pulmonary disease",
            "J44.9",
            "Chronic obstructive pulmonary disease, unspecified",
            CodeType::Condition,
        ),
    ]
}

/// Semantic memory of verified mappings, one exact k-NN index per code type.
pub struct ExampleStore {
    embedder: Arc<dyn EmbeddingClient>,
    dimension: usize,
    indices: RwLock<Indices>,
    seed_lock: Mutex<()>,
    snapshot_lock: Mutex<()>,
    max_per_type: usize,
    snapshot_path: Option<PathBuf>,
}

impl ExampleStore {
    /// Create an empty store backed by the given embedding client.
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            dimension,
            indices: RwLock::new(Indices::default()),
            seed_lock: Mutex::new(()),
            snapshot_lock: Mutex::new(()),
            max_per_type: usize::MAX,
            snapshot_path: None,
        }
    }

    /// Refuse inserts once a type holds this many examples.
    pub fn with_capacity_per_type(mut self, max_per_type: usize) -> Self {
        self.max_per_type = max_per_type;
        self
    }

    /// Write the corpus to `path` after every successful insert.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of examples stored for a type.
    pub fn len(&self, code_type: CodeType) -> usize {
        self.read().get(code_type).len()
    }

    /// True when neither index holds any example.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// (medication, condition) example counts.
    pub fn counts(&self) -> (usize, usize) {
        let indices = self.read();
        (indices.medication.len(), indices.condition.len())
    }

    /// A copy of every example of a type, in id order.
    pub fn examples(&self, code_type: CodeType) -> Vec<CodeExample> {
        self.read().get(code_type).examples.clone()
    }

    /// Load the seed set if, and only if, both indices are empty.
    pub async fn ensure_seeded(&self) {
        if !self.is_empty() {
            return;
        }
        let _guard = self.seed_lock.lock().await;
        if !self.is_empty() {
            return;
        }

        let seeds = seed_examples();
        let texts: Vec<String> = seeds.iter().map(|e| e.text.clone()).collect();

        let vectors = match self.embedder.embed(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                error!("Failed to generate embeddings for initial examples: {}", e);
                return;
            }
        };
        if vectors.len() != texts.len() {
            error!(
                "Failed to generate embeddings for initial examples: expected {}, got {}",
                texts.len(),
                vectors.len()
            );
            return;
        }
        if let Some(bad) = vectors.iter().find(|v| !self.is_usable(v)) {
            error!(
                "Seed embedding unusable (dimension {}, expected {})",
                bad.len(),
                self.dimension
            );
            return;
        }

        {
            let mut indices = self.write();
            if !indices.is_empty() {
                return;
            }
            for (example, vector) in seeds.into_iter().zip(vectors) {
                indices.get_mut(example.code_type).push(vector, example);
            }
            info!(
                "Loaded {} medication examples and {} condition examples",
                indices.medication.len(),
                indices.condition.len()
            );
        }
        self.persist_snapshot().await;
    }

    fn is_usable(&self, vector: &[f32]) -> bool {
        vector.len() == self.dimension && !VectorOps::is_zero(vector)
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(&[text.to_string()]).await {
            Ok(mut vectors) if vectors.len() == 1 => {
                let vector = vectors.remove(0);
                if self.is_usable(&vector) {
                    Some(vector)
                } else {
                    warn!(
                        "Unusable embedding for {:?} (dimension {}, expected {})",
                        text,
                        vector.len(),
                        self.dimension
                    );
                    None
                }
            }
            Ok(vectors) => {
                warn!("Expected 1 embedding for {:?}, got {}", text, vectors.len());
                None
            }
            Err(e) => {
                warn!("Failed to generate embedding for {:?}: {}", text, e);
                None
            }
        }
    }

    /// Embed and append a verified example.
    pub async fn add(&self, example: CodeExample) -> AddOutcome {
        let code_type = example.code_type;
        if !example.confidence.is_finite() {
            warn!("Refusing example {:?} with confidence {}", example.text, example.confidence);
            return AddOutcome::Rejected;
        }
        {
            let indices = self.read();
            let index = indices.get(code_type);
            if let Some(id) = index.find(&example.text, &example.code) {
                debug!("Example already stored: {} -> {}", example.text, example.code);
                return AddOutcome::Duplicate(id);
            }
            if index.len() >= self.max_per_type {
                warn!(
                    "{} index at capacity ({}), not storing {:?}",
                    code_type, self.max_per_type, example.text
                );
                return AddOutcome::Rejected;
            }
        }

        let Some(vector) = self.embed_one(&example.text).await else {
            warn!("Failed to generate embedding for example: {}", example.text);
            return AddOutcome::Rejected;
        };

        let id = {
            let mut indices = self.write();
            let index = indices.get_mut(code_type);
            // Re-checked: another writer may have landed while embedding.
            if let Some(id) = index.find(&example.text, &example.code) {
                return AddOutcome::Duplicate(id);
            }
            if index.len() >= self.max_per_type {
                return AddOutcome::Rejected;
            }
            info!(
                "Storing {} example {:?} -> {} (confidence {:.2})",
                code_type, example.text, example.code, example.confidence
            );
            index.push(vector, example)
        };

        self.persist_snapshot().await;
        AddOutcome::Inserted(id)
    }

    /// Up to `k` examples of a type, nearest first.
    pub async fn query(&self, text: &str, code_type: CodeType, k: usize) -> Vec<CodeExample> {
        self.ensure_seeded().await;

        if self.len(code_type) == 0 {
            return Vec::new();
        }

        let Some(query) = self.embed_one(text).await else {
            warn!("Failed to generate embedding for query: {}", text);
            return Vec::new();
        };

        let indices = self.read();
        let index = indices.get(code_type);
        VectorOps::nearest(&index.vectors, &query, k)
            .into_iter()
            .map(|n| index.examples[n.id].clone())
            .collect()
    }

    /// Render examples as numbered prompt blocks.
    pub fn format_for_prompt(examples: &[CodeExample]) -> String {
        if examples.is_empty() {
            return NO_EXAMPLES.to_string();
        }

        let mut lines = Vec::with_capacity(examples.len() * 5);
        for (i, example) in examples.iter().enumerate() {
            lines.push(format!("Example {}:", i + 1));
            lines.push(format!("  Text: \"{}\"", example.text));
            lines.push(format!("  Code: {}", example.code));
            lines.push(format!("  Description: {}", example.description));
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Replace the corpus with the snapshot at the configured path.
    ///
    /// Returns the number of examples restored; a missing file restores none.
    pub async fn load_snapshot(&self) -> anyhow::Result<usize> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(0);
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No example snapshot at {}", path.display());
            return Ok(0);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;

        if snapshot.dimension != self.dimension {
            return Err(anyhow!(
                "Snapshot dimension {} does not match embedding dimension {}",
                snapshot.dimension,
                self.dimension
            ));
        }
        let indices = snapshot.indices;
        if !indices.medication.is_consistent(self.dimension)
            || !indices.condition.is_consistent(self.dimension)
        {
            return Err(anyhow!("Snapshot {} is inconsistent", path.display()));
        }

        let restored = indices.medication.len() + indices.condition.len();
        *self.write() = indices;
        info!("Restored {} examples from {}", restored, path.display());
        Ok(restored)
    }

    async fn persist_snapshot(&self) {
        let Some(path) = self.snapshot_path.as_deref() else {
            return;
        };
        // Held across serialize and write so the newest corpus lands last.
        let _guard = self.snapshot_lock.lock().await;
        let serialized = {
            let indices = self.read();
            serde_json::to_string(&SnapshotRef {
                dimension: self.dimension,
                indices: &*indices,
            })
        };
        let result = match serialized {
            Ok(json) => write_atomically(path, json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Failed to write example snapshot {}: {}", path.display(), e);
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    indices: &'a Indices,
}

async fn write_atomically(path: &Path, contents: String) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
