//! In-process embedding cache and recall (§4.E).
//!
//! A global vector map shared across every project, plus a bounded LRU of
//! per-project vector maps (10 projects by default, 60s idle TTL per
//! bucket). Recall ranks candidates by cosine similarity with a
//! deterministic tie-break (score desc, then recency desc, then id asc)
//! so repeated recalls over unchanged data always return the same order.
//! [`recall_lexical`] is the fallback used when embedding generation
//! itself fails: a substring-match score capped below any real cosine
//! hit.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::RwLock;

use crate::error::MemoryError;
use crate::store::{MemoryScope as StoreScope, MemoryStore};

const DEFAULT_PROJECT_CAPACITY: usize = 10;
const DEFAULT_PROJECT_TTL: Duration = Duration::from_secs(60);
/// Lexical-fallback scores are synthetic and always rank below a genuine
/// embedding match.
const LEXICAL_SCORE_CAP: f64 = 0.5;

#[derive(Debug, Clone)]
struct VectorEntry {
    vector: Vec<f32>,
    created_at: i64,
}

struct ProjectBucket {
    vectors: HashMap<String, VectorEntry>,
    expires_at: Instant,
}

/// Which records a recall should consider.
#[derive(Debug, Clone)]
pub enum RecallScope {
    /// Only the global vector map.
    Global,
    /// Only the named project's bucket.
    Project(String),
    /// Global and the named project's bucket, merged.
    Both(String),
}

/// A single recall result: a record id and its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallHit {
    /// The matched record's id.
    pub id: String,
    /// Cosine similarity in `[-1, 1]`, or a synthetic lexical score in
    /// `[0, 0.5]` when produced by [`recall_lexical`].
    pub score: f64,
}

/// In-process vector cache layered in front of [`crate::store::MemoryStore`].
pub struct EmbeddingCache {
    global: RwLock<HashMap<String, VectorEntry>>,
    projects: Mutex<LruCache<String, ProjectBucket>>,
    project_ttl: Duration,
}

impl EmbeddingCache {
    /// Construct a cache with the default per-project capacity (10) and
    /// idle TTL (60s).
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_PROJECT_CAPACITY, DEFAULT_PROJECT_TTL)
    }

    /// Construct a cache with an explicit per-project bucket capacity and
    /// idle TTL.
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_PROJECT_CAPACITY).unwrap());
        Self {
            global: RwLock::new(HashMap::new()),
            projects: Mutex::new(LruCache::new(capacity)),
            project_ttl: ttl,
        }
    }

    /// Cache (or replace) a global-scope embedding.
    pub async fn put_global(&self, id: impl Into<String>, vector: Vec<f32>, created_at: i64) {
        let mut map = self.global.write().await;
        map.insert(id.into(), VectorEntry { vector, created_at });
    }

    /// Cache (or replace) a project-scope embedding. Touches the
    /// project's bucket, resetting its idle TTL and LRU recency.
    pub fn put_project(&self, project: &str, id: impl Into<String>, vector: Vec<f32>, created_at: i64) {
        let ttl = self.project_ttl;
        let mut projects = self.projects.lock().expect("embedding cache mutex poisoned");
        if projects.get_mut(project).is_none() {
            projects.put(
                project.to_string(),
                ProjectBucket {
                    vectors: HashMap::new(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
        let bucket = projects.get_mut(project).expect("bucket just inserted");
        bucket.vectors.insert(id.into(), VectorEntry { vector, created_at });
        bucket.expires_at = Instant::now() + ttl;
    }

    /// Remove a global-scope embedding, e.g. after the backing record is
    /// deleted.
    pub async fn remove_global(&self, id: &str) {
        let mut map = self.global.write().await;
        map.remove(id);
    }

    /// Remove a project-scope embedding, if its bucket is still live.
    pub fn remove_project(&self, project: &str, id: &str) {
        let mut projects = self.projects.lock().expect("embedding cache mutex poisoned");
        if let Some(bucket) = projects.peek_mut(project) {
            bucket.vectors.remove(id);
        }
    }

    async fn global_snapshot(&self) -> Vec<(String, VectorEntry)> {
        let map = self.global.read().await;
        map.iter().map(|(id, e)| (id.clone(), e.clone())).collect()
    }

    fn project_snapshot(&self, project: &str) -> Vec<(String, VectorEntry)> {
        let mut projects = self.projects.lock().expect("embedding cache mutex poisoned");
        match projects.get(project) {
            Some(bucket) if bucket.expires_at > Instant::now() => {
                bucket.vectors.iter().map(|(id, e)| (id.clone(), e.clone())).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Rank cached embeddings in `scope` against `query` by cosine
    /// similarity, returning the top `top_k` with a deterministic
    /// tie-break: score descending, then `created_at` descending, then id
    /// ascending.
    pub async fn recall(&self, scope: &RecallScope, query: &[f32], top_k: usize) -> Vec<RecallHit> {
        let mut candidates = match scope {
            RecallScope::Global => self.global_snapshot().await,
            RecallScope::Project(project) => self.project_snapshot(project),
            RecallScope::Both(project) => {
                let mut all = self.global_snapshot().await;
                all.extend(self.project_snapshot(project));
                all
            }
        };
        candidates.sort_by(|a, b| a.0.cmp(&b.0)); // stable base order before scoring
        rank(
            candidates
                .into_iter()
                .map(|(id, e)| (id, cosine_similarity(query, &e.vector), e.created_at)),
            top_k,
        )
    }

    /// Reload the global vector map from `store` if it is currently
    /// empty — cold start after a restart, or every entry evicted.
    async fn ensure_global_warm(&self, store: &MemoryStore) -> Result<(), MemoryError> {
        if self.global.read().await.is_empty() {
            let rows = store.list_embeddings(&StoreScope::Global).await?;
            if !rows.is_empty() {
                let mut map = self.global.write().await;
                for (id, vector, created_at) in rows {
                    map.entry(id).or_insert(VectorEntry { vector, created_at });
                }
            }
        }
        Ok(())
    }

    /// Reload `project`'s bucket from `store` if it is missing or its
    /// idle TTL has expired.
    async fn ensure_project_warm(&self, store: &MemoryStore, project: &str) -> Result<(), MemoryError> {
        let needs_reload = {
            let mut projects = self.projects.lock().expect("embedding cache mutex poisoned");
            match projects.get(project) {
                Some(bucket) => bucket.expires_at <= Instant::now(),
                None => true,
            }
        };
        if !needs_reload {
            return Ok(());
        }
        let rows = store.list_embeddings(&StoreScope::Project(project.to_string())).await?;
        let mut vectors = HashMap::new();
        for (id, vector, created_at) in rows {
            vectors.insert(id, VectorEntry { vector, created_at });
        }
        let ttl = self.project_ttl;
        let mut projects = self.projects.lock().expect("embedding cache mutex poisoned");
        projects.put(project.to_string(), ProjectBucket { vectors, expires_at: Instant::now() + ttl });
        Ok(())
    }

    /// Like [`Self::recall`], but first reloads the relevant scope from
    /// `store` when the cache is cold for it — process restart, an
    /// evicted project bucket, or an expired TTL bucket — per §4.E: "on
    /// cache miss it reloads from the store."
    pub async fn recall_or_reload(
        &self,
        store: &MemoryStore,
        scope: &RecallScope,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<RecallHit>, MemoryError> {
        match scope {
            RecallScope::Global => self.ensure_global_warm(store).await?,
            RecallScope::Project(p) => self.ensure_project_warm(store, p).await?,
            RecallScope::Both(p) => {
                self.ensure_global_warm(store).await?;
                self.ensure_project_warm(store, p).await?;
            }
        }
        Ok(self.recall(scope, query, top_k).await)
    }

    /// Warm the global bucket from `store` at startup, so the first
    /// recall after a process restart doesn't pay the cold-cache reload.
    pub async fn warm_global(&self, store: &MemoryStore) -> Result<(), MemoryError> {
        self.ensure_global_warm(store).await
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexical substring-match fallback used when embedding generation fails.
/// `corpus` yields `(id, text, created_at)` triples; every query word of
/// at least 3 characters that appears in a candidate's lowercased text
/// counts as a hit. Scores are capped at [`LEXICAL_SCORE_CAP`] so a
/// lexical match never outranks a genuine embedding recall.
pub fn recall_lexical<'a>(
    query_text: &str,
    corpus: impl IntoIterator<Item = (&'a str, &'a str, i64)>,
    top_k: usize,
) -> Vec<RecallHit> {
    let words: Vec<String> = query_text
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_string())
        .collect();
    if words.is_empty() {
        return Vec::new();
    }
    let scored = corpus.into_iter().filter_map(|(id, text, created_at)| {
        let haystack = text.to_lowercase();
        let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
        if hits == 0 {
            return None;
        }
        let score = LEXICAL_SCORE_CAP * (hits as f64 / words.len() as f64);
        Some((id.to_string(), score, created_at))
    });
    rank(scored, top_k)
}

fn rank(candidates: impl Iterator<Item = (String, f64, i64)>, top_k: usize) -> Vec<RecallHit> {
    let mut scored: Vec<(String, f64, i64)> = candidates.collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored.into_iter().map(|(id, score, _)| RecallHit { id, score }).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
