//! Embedding and similarity engine.
//!
//! The embedding model is a constructor-injected capability: anything
//! implementing `EmbeddingProvider` can back the pipeline, and tests use
//! deterministic vectors. The default backend is a local fastembed model.
//!
//! Ranking is a full scan over the stored vectors of one index kind - the
//! corpus is a single developer's machine, brute force is fast enough and
//! needs no approximate index.

use crate::store::{GraphStore, StoredEmbedding};
use crate::{Error, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Serialize;

/// Index kind tag for code symbol vectors
pub const INDEX_KIND_CODE: &str = "code";
/// Index kind tag for documentation vectors
pub const INDEX_KIND_DOCS: &str = "documentation";

/// A pluggable text-to-vector capability.
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed output vector length
    fn dimension(&self) -> usize;

    /// Embed a batch of texts; one vector per input, in order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Local transformer model via fastembed.
pub struct FastembedProvider {
    model: TextEmbedding,
    dim: usize,
}

impl FastembedProvider {
    /// Load the default model. Failure here must degrade indexing to
    /// "skip embeddings" at the call site, not abort it.
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| Error::Embedding(format!("failed to load embedding model: {}", e)))?;

        // Learn the dimension from a probe instead of trusting a constant
        let probe = model
            .embed(vec!["dimension probe".to_string()], None)
            .map_err(|e| Error::Embedding(format!("embedding probe failed: {}", e)))?;
        let dim = probe.first().map(|v| v.len()).unwrap_or(0);
        if dim == 0 {
            return Err(Error::Embedding("model produced empty vectors".into()));
        }
        Ok(Self { model, dim })
    }
}

impl EmbeddingProvider for FastembedProvider {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(format!("embedding generation failed: {}", e)))
    }
}

/// Text fed to the provider for one code symbol: name, signature or
/// qualified name, and docstring.
pub fn symbol_embedding_text(name: &str, signature: Option<&str>, fqn: &str, doc: Option<&str>) -> String {
    let mut parts = vec![format!("Name: {}", name)];
    match signature {
        Some(sig) => parts.push(format!("Signature: {}", sig)),
        None => parts.push(format!("Signature: {}", fqn)),
    }
    if let Some(doc) = doc {
        if !doc.is_empty() {
            parts.push(format!("Documentation: {}", doc));
        }
    }
    parts.join("\n")
}

/// Cosine similarity: dot(a,b) / (||a|| * ||b||), defined as 0 when
/// either norm is zero or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Score every candidate against the query, sort descending (stable, so
/// ties keep insertion order), truncate to `top_k`.
pub fn rank_by_similarity<'a>(
    query: &[f32],
    candidates: &'a [StoredEmbedding],
    top_k: usize,
) -> Vec<(&'a StoredEmbedding, f32)> {
    let mut scored: Vec<(&StoredEmbedding, f32)> = candidates
        .iter()
        .map(|c| (c, cosine_similarity(query, &c.vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// One semantic search result
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub identifier: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
}

fn hit_from(embedding: &StoredEmbedding, score: f32) -> SemanticHit {
    let identifier = embedding
        .fqn
        .clone()
        .or_else(|| embedding.symbol_id.map(|id| format!("symbol_{}", id)))
        .or_else(|| embedding.blob_id.map(|id| format!("doc_{}", id)))
        .unwrap_or_else(|| format!("emb_{}", embedding.id));
    SemanticHit {
        identifier,
        score,
        path: embedding.path.clone(),
        start_line: embedding.start_line,
        end_line: embedding.end_line,
    }
}

/// Semantic search over code symbol vectors.
pub fn search_code_semantic(
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    query: &str,
    repo_id: Option<i64>,
    top_k: usize,
) -> Result<Vec<SemanticHit>> {
    let query_vec = embed_one(provider, query)?;
    let candidates = store.embeddings(INDEX_KIND_CODE, repo_id)?;
    Ok(rank_by_similarity(&query_vec, &candidates, top_k)
        .into_iter()
        .map(|(emb, score)| hit_from(emb, score))
        .collect())
}

/// Semantic search over documentation vectors.
pub fn search_docs_semantic(
    store: &GraphStore,
    provider: &dyn EmbeddingProvider,
    query: &str,
    repo_id: Option<i64>,
    top_k: usize,
) -> Result<Vec<SemanticHit>> {
    let query_vec = embed_one(provider, query)?;
    let candidates = store.embeddings(INDEX_KIND_DOCS, repo_id)?;
    Ok(rank_by_similarity(&query_vec, &candidates, top_k)
        .into_iter()
        .map(|(emb, score)| hit_from(emb, score))
        .collect())
}

/// Rank stored code vectors against one symbol's own vector.
pub fn find_similar_symbols(
    store: &GraphStore,
    symbol_id: i64,
    top_k: usize,
) -> Result<Vec<SemanticHit>> {
    let Some(reference) = store.embedding_for_symbol(symbol_id)? else {
        return Err(Error::NotFound(format!(
            "no embedding stored for symbol {}",
            symbol_id
        )));
    };
    let candidates: Vec<StoredEmbedding> = store
        .embeddings(INDEX_KIND_CODE, None)?
        .into_iter()
        .filter(|c| c.symbol_id != Some(symbol_id))
        .collect();
    Ok(rank_by_similarity(&reference, &candidates, top_k)
        .into_iter()
        .map(|(emb, score)| hit_from(emb, score))
        .collect())
}

fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()])?;
    if vectors.is_empty() {
        return Err(Error::Embedding("provider returned no vector".into()));
    }
    Ok(vectors.remove(0))
}

// --- Vector codec (little-endian f32) ---

pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Deterministic provider used by the crate's tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Vectors derived from byte sums: stable across runs, never zero for
    /// non-empty text.
    pub struct StubProvider {
        pub dim: usize,
    }

    impl EmbeddingProvider for StubProvider {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    (0..self.dim)
                        .map(|i| {
                            t.bytes()
                                .skip(i)
                                .step_by(self.dim)
                                .map(|b| b as f32)
                                .sum::<f32>()
                        })
                        .collect()
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubProvider;
    use super::*;

    #[test]
    fn test_cosine_bounds() {
        let a = vec![1.0, 2.0, -3.0];
        let b = vec![-4.0, 0.5, 2.0];
        let sim = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_cosine_self_is_one() {
        let a = vec![0.3, -0.7, 0.1];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let zero = vec![0.0, 0.0];
        let other = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
        assert_eq!(cosine_similarity(&other, &zero), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    fn stored(id: i64, vector: Vec<f32>) -> StoredEmbedding {
        StoredEmbedding {
            id,
            symbol_id: Some(id),
            blob_id: None,
            vector,
            fqn: Some(format!("m.sym{}", id)),
            path: None,
            start_line: None,
            end_line: None,
        }
    }

    #[test]
    fn test_ranking_orders_descending_and_truncates() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            stored(1, vec![0.0, 1.0]),  // orthogonal
            stored(2, vec![1.0, 0.0]),  // identical
            stored(3, vec![1.0, 1.0]),  // partial
        ];
        let ranked = rank_by_similarity(&query, &candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.id, 2);
        assert_eq!(ranked[1].0.id, 3);
    }

    #[test]
    fn test_ranking_ties_keep_insertion_order() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            stored(10, vec![2.0, 0.0]),
            stored(11, vec![5.0, 0.0]),  // same direction, same cosine
        ];
        let ranked = rank_by_similarity(&query, &candidates, 10);
        assert_eq!(ranked[0].0.id, 10);
        assert_eq!(ranked[1].0.id, 11);
    }

    #[test]
    fn test_vector_codec_roundtrip() {
        let original = vec![0.25f32, -1.5, 1e-7, 42.0];
        let decoded = bytes_to_vector(&vector_to_bytes(&original));
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_symbol_embedding_text() {
        let text = symbol_embedding_text(
            "alpha",
            Some("alpha(a)"),
            "example.alpha",
            Some("Does things"),
        );
        assert!(text.contains("Name: alpha"));
        assert!(text.contains("Signature: alpha(a)"));
        assert!(text.contains("Documentation: Does things"));

        let no_sig = symbol_embedding_text("beta", None, "example.beta", None);
        assert!(no_sig.contains("Signature: example.beta"));
    }

    #[test]
    fn test_stub_provider_is_deterministic() {
        let provider = StubProvider { dim: 4 };
        let first = provider.embed(&["hello".to_string()]).unwrap();
        let second = provider.embed(&["hello".to_string()]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 4);
    }
}
