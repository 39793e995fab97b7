//! Embedding function.
//!
//! Text is tokenized into lowercase alphanumeric words and each word is
//! hashed into one of `dimensions` signed buckets. The vector is L2
//! normalized so cosine similarity reduces to a dot product.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use super::ComponentError;

/// A loaded embedding model.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingFunction {
    model: String,
    dimensions: usize,
}

impl EmbeddingFunction {
    /// Load the named model with the given output width.
    pub fn load(model: &str, dimensions: usize) -> Result<Self, ComponentError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ComponentError::Unavailable(
                "no embedding model configured".to_string(),
            ));
        }
        if dimensions == 0 {
            return Err(ComponentError::Unavailable(format!(
                "embedding model '{}' needs at least one dimension",
                model
            )));
        }
        Ok(Self {
            model: model.to_string(),
            dimensions,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    pub fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::vector::cosine_similarity;

    #[test]
    fn test_empty_model_fails_to_load() {
        assert!(EmbeddingFunction::load("  ", 8).is_err());
        assert!(EmbeddingFunction::load("mini", 0).is_err());
    }

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let f = EmbeddingFunction::load("mini", 64).unwrap();
        let a = f.embed("Lazy loading saves memory");
        let b = f.embed("lazy LOADING saves memory!");

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let f = EmbeddingFunction::load("mini", 16).unwrap();
        assert!(f.embed("  ,,, ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let f = EmbeddingFunction::load("mini", 256).unwrap();
        let query = f.embed("worker recycling memory");
        let close = f.embed("recycling a worker bounds memory growth");
        let far = f.embed("the quick brown fox");

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }
}
