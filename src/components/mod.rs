//! Heavy subsystems constructed on demand.
//!
//! Nothing in this module is built at startup. Each route group registers
//! factories for the components it owns, and the registry runs a factory
//! the first time a request needs that component.

pub mod chunking;
pub mod embedding;
pub mod engines;
pub mod vector;

pub use chunking::split_text;
pub use embedding::EmbeddingFunction;
pub use engines::{AudioEngine, ImageEngine, WebSearchEngine};
pub use vector::{cosine_similarity, SearchHit, VectorBackend, VectorStore};

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigSnapshot;
use crate::error::Result;
use crate::startup::LazyComponentRegistry;

/// Vector database client.
pub const VECTOR_STORE: &str = "vector_store";
/// Embedding model.
pub const EMBEDDING_FN: &str = "embedding_fn";
/// Speech engine.
pub const AUDIO_ENGINE: &str = "audio_engine";
/// Image generation engine.
pub const IMAGE_ENGINE: &str = "image_engine";
/// Web search engine.
pub const WEB_SEARCH: &str = "web_search";

/// Why a component could not be built or used.
#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("embedding has {actual} dimensions but the store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Unavailable(String),
}

/// Register the vector store and embedding function.
pub fn register_retrieval(
    registry: &LazyComponentRegistry,
    snapshot: &Arc<ConfigSnapshot>,
) -> Result<()> {
    let config = Arc::clone(snapshot);
    registry.register(VECTOR_STORE, move || {
        VectorStore::connect(
            config.vector_backend(),
            config.qdrant_multitenancy(),
            config.embedding_dimensions(),
        )
    })?;

    let config = Arc::clone(snapshot);
    registry.register(EMBEDDING_FN, move || {
        EmbeddingFunction::load(config.embedding_model(), config.embedding_dimensions())
    })
}

pub fn register_audio(registry: &LazyComponentRegistry, snapshot: &Arc<ConfigSnapshot>) -> Result<()> {
    let config = Arc::clone(snapshot);
    registry.register(AUDIO_ENGINE, move || AudioEngine::from_snapshot(&config))
}

pub fn register_images(registry: &LazyComponentRegistry, snapshot: &Arc<ConfigSnapshot>) -> Result<()> {
    let config = Arc::clone(snapshot);
    registry.register(IMAGE_ENGINE, move || ImageEngine::from_snapshot(&config))
}

pub fn register_web_search(
    registry: &LazyComponentRegistry,
    snapshot: &Arc<ConfigSnapshot>,
) -> Result<()> {
    let config = Arc::clone(snapshot);
    registry.register(WEB_SEARCH, move || WebSearchEngine::from_snapshot(&config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use crate::startup::ComponentState;

    #[test]
    fn test_registration_builds_nothing() {
        let registry = LazyComponentRegistry::new();
        let snapshot = Arc::new(ConfigSnapshot::default());
        register_retrieval(&registry, &snapshot).unwrap();

        assert_eq!(registry.keys().len(), 2);
        assert_eq!(registry.state(VECTOR_STORE), Some(ComponentState::Unbuilt));
        assert_eq!(registry.instantiated_count(), 0);
    }

    #[test]
    fn test_disabled_vector_db_fails_on_first_use() {
        let mut config = Config::default();
        config.retrieval.vector_db = "disabled".to_string();
        let snapshot = Arc::new(config.resolve().unwrap());

        let registry = LazyComponentRegistry::new();
        register_retrieval(&registry, &snapshot).unwrap();

        let err = registry.resolve_as::<VectorStore>(VECTOR_STORE).unwrap_err();
        assert!(matches!(err, Error::Initialization { .. }));
        assert_eq!(registry.state(VECTOR_STORE), Some(ComponentState::Failed));

        // The embedding function is unaffected.
        let embed = registry.resolve_as::<EmbeddingFunction>(EMBEDDING_FN).unwrap();
        assert_eq!(embed.dimensions(), 384);
    }
}
