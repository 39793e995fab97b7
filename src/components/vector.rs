//! Vector store client.
//!
//! The store keeps embedded chunks in process memory and answers top-k
//! cosine similarity queries with a linear scan. The configured backend
//! name selects the client flavour; `disabled` refuses to connect.

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::ComponentError;
use crate::error::{Error, Result};

/// Vector database backend selected by `VECTOR_DB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Disabled,
    Chroma,
    Qdrant,
    Milvus,
    Pinecone,
    OpenSearch,
    PgVector,
    Elasticsearch,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorBackend::Disabled => "disabled",
            VectorBackend::Chroma => "chroma",
            VectorBackend::Qdrant => "qdrant",
            VectorBackend::Milvus => "milvus",
            VectorBackend::Pinecone => "pinecone",
            VectorBackend::OpenSearch => "opensearch",
            VectorBackend::PgVector => "pgvector",
            VectorBackend::Elasticsearch => "elasticsearch",
        }
    }
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "none" | "" => Ok(VectorBackend::Disabled),
            "chroma" => Ok(VectorBackend::Chroma),
            "qdrant" => Ok(VectorBackend::Qdrant),
            "milvus" => Ok(VectorBackend::Milvus),
            "pinecone" => Ok(VectorBackend::Pinecone),
            "opensearch" => Ok(VectorBackend::OpenSearch),
            "pgvector" => Ok(VectorBackend::PgVector),
            "elasticsearch" => Ok(VectorBackend::Elasticsearch),
            other => Err(Error::config(
                "VECTOR_DB",
                format!("unsupported vector backend '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredChunk {
    collection: String,
    text: String,
    embedding: Vec<f32>,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub collection: String,
    pub text: String,
    pub score: f32,
}

/// In-process vector store client.
#[derive(Debug)]
pub struct VectorStore {
    backend: VectorBackend,
    multitenancy: bool,
    dimensions: usize,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl VectorStore {
    /// Connect to the configured backend.
    pub fn connect(
        backend: VectorBackend,
        multitenancy: bool,
        dimensions: usize,
    ) -> std::result::Result<Self, ComponentError> {
        if backend == VectorBackend::Disabled {
            return Err(ComponentError::Disabled("vector database"));
        }
        Ok(Self {
            backend,
            multitenancy: multitenancy && backend == VectorBackend::Qdrant,
            dimensions,
            chunks: RwLock::new(Vec::new()),
        })
    }

    pub fn backend(&self) -> VectorBackend {
        self.backend
    }

    /// Whether collections share one physical index keyed by tenant.
    pub fn multitenancy(&self) -> bool {
        self.multitenancy
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Store an embedded chunk, returning the collection's new size.
    pub fn insert(
        &self,
        collection: &str,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> std::result::Result<usize, ComponentError> {
        if embedding.len() != self.dimensions {
            return Err(ComponentError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        let mut chunks = self.chunks.write();
        chunks.push(StoredChunk {
            collection: collection.to_string(),
            text: text.into(),
            embedding,
        });
        Ok(chunks.iter().filter(|c| c.collection == collection).count())
    }

    /// Number of chunks in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.chunks
            .read()
            .iter()
            .filter(|c| c.collection == collection)
            .count()
    }

    /// Top-`k` chunks of `collection` by cosine similarity to `query`.
    pub fn search(&self, collection: &str, query: &[f32], k: usize) -> Vec<SearchHit> {
        let chunks = self.chunks.read();
        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .filter(|c| c.collection == collection)
            .map(|c| SearchHit {
                collection: c.collection.clone(),
                text: c.text.clone(),
                score: cosine_similarity(query, &c.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity in [-1, 1]; zero for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Chroma".parse::<VectorBackend>().unwrap(), VectorBackend::Chroma);
        assert_eq!("pgvector".parse::<VectorBackend>().unwrap(), VectorBackend::PgVector);
        assert_eq!("disabled".parse::<VectorBackend>().unwrap(), VectorBackend::Disabled);
        assert!("redis".parse::<VectorBackend>().is_err());
        assert_eq!(VectorBackend::OpenSearch.to_string(), "opensearch");
    }

    #[test]
    fn test_disabled_backend_refuses_to_connect() {
        let err = VectorStore::connect(VectorBackend::Disabled, false, 4).unwrap_err();
        assert!(matches!(err, ComponentError::Disabled(_)));
    }

    #[test]
    fn test_multitenancy_only_applies_to_qdrant() {
        assert!(VectorStore::connect(VectorBackend::Qdrant, true, 4).unwrap().multitenancy());
        assert!(!VectorStore::connect(VectorBackend::Chroma, true, 4).unwrap().multitenancy());
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let store = VectorStore::connect(VectorBackend::Chroma, false, 2).unwrap();
        store.insert("docs", "east", vec![1.0, 0.0]).unwrap();
        store.insert("docs", "north", vec![0.0, 1.0]).unwrap();
        store.insert("docs", "north-east", vec![0.7, 0.7]).unwrap();
        store.insert("other", "elsewhere", vec![1.0, 0.0]).unwrap();

        let hits = store.search("docs", &[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "north-east");
        assert_eq!(store.count("docs"), 3);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let store = VectorStore::connect(VectorBackend::Chroma, false, 3).unwrap();
        let err = store.insert("docs", "short", vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            ComponentError::DimensionMismatch { expected: 3, actual: 1 }
        ));
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[5.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
