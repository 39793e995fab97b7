//! Route handlers.
//!
//! Handlers that need a heavy component resolve it through the registry on
//! a blocking thread: the first request builds it, later ones hit the cache.

use std::any::Any;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{debug, info};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::types::*;
use crate::components::{
    split_text, AudioEngine, EmbeddingFunction, ImageEngine, VectorStore, WebSearchEngine,
    AUDIO_ENGINE, EMBEDDING_FN, IMAGE_ENGINE, VECTOR_STORE, WEB_SEARCH,
};

/// Resolve a component without blocking the async runtime.
async fn component<T: Any + Send + Sync>(
    state: &Arc<AppState>,
    key: &'static str,
) -> ApiResult<Arc<T>> {
    let registry = Arc::clone(&state.registry);
    let instance = tokio::task::spawn_blocking(move || registry.resolve_as::<T>(key)).await??;
    Ok(instance)
}

// ============================================================================
// Core
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.uptime_secs(),
        worker: state.lifecycle.id().to_string(),
    })
}

/// Mounted groups, registered components and the worker record.
pub async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let groups: Vec<_> = state.plan.groups().collect();
    let endpoints = groups
        .iter()
        .flat_map(|g| g.endpoints().iter())
        .map(|&(method, path)| EndpointInfo { method, path })
        .collect();
    let components = state
        .registry
        .keys()
        .into_iter()
        .filter_map(|key| {
            let build_state = state.registry.state(key.as_str())?;
            Some(ComponentInfo {
                key,
                state: build_state,
            })
        })
        .collect();

    Json(InfoResponse {
        name: "leanserve",
        version: crate::version(),
        groups,
        endpoints,
        components,
        worker: state.lifecycle.record(),
    })
}

// ============================================================================
// Retrieval
// ============================================================================

/// Chunk, embed and store documents.
pub async fn add_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddDocumentsRequest>,
) -> ApiResult<Json<AddDocumentsResponse>> {
    let snapshot = &state.snapshot;

    if request.documents.is_empty() {
        return Err(ApiError::BadRequest("no documents supplied".to_string()));
    }
    if let Some(max) = snapshot.file_max_count() {
        if request.documents.len() > max {
            return Err(ApiError::PayloadTooLarge(format!(
                "{} documents exceeds the limit of {}",
                request.documents.len(),
                max
            )));
        }
    }
    if let Some(max) = snapshot.file_max_size_bytes() {
        if let Some(doc) = request
            .documents
            .iter()
            .find(|d| d.content.len() as u64 > max)
        {
            return Err(ApiError::PayloadTooLarge(format!(
                "document '{}' is {} bytes; the limit is {}",
                doc.name.as_deref().unwrap_or("<unnamed>"),
                doc.content.len(),
                max
            )));
        }
    }

    let embedder = component::<EmbeddingFunction>(&state, EMBEDDING_FN).await?;
    let store = component::<VectorStore>(&state, VECTOR_STORE).await?;

    let chunk_size = snapshot.chunk_size();
    let overlap = snapshot.chunk_overlap();
    let collection = request.collection;
    let documents = request.documents;
    let document_count = documents.len();

    let (chunks, total_chunks) = {
        let collection = collection.clone();
        tokio::task::spawn_blocking(move || -> ApiResult<(usize, usize)> {
            let mut chunks = 0;
            let mut total = store.count(&collection);
            for doc in &documents {
                for chunk in split_text(&doc.content, chunk_size, overlap) {
                    let embedding = embedder.embed(&chunk);
                    total = store.insert(&collection, chunk, embedding)?;
                    chunks += 1;
                }
            }
            Ok((chunks, total))
        })
        .await??
    };

    info!(collection = %collection, chunks, "Documents ingested");
    Ok(Json(AddDocumentsResponse {
        collection,
        documents: document_count,
        chunks,
        total_chunks,
    }))
}

/// Top-k similarity search.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query is empty".to_string()));
    }
    let k = match request.k {
        Some(0) => return Err(ApiError::BadRequest("k must be at least 1".to_string())),
        Some(k) => k,
        None => state.snapshot.top_k(),
    };

    let embedder = component::<EmbeddingFunction>(&state, EMBEDDING_FN).await?;
    let store = component::<VectorStore>(&state, VECTOR_STORE).await?;

    let embedding = embedder.embed(&request.query);
    let hits = store.search(&request.collection, &embedding, k);
    debug!(collection = %request.collection, hits = hits.len(), "Query served");

    Ok(Json(QueryResponse {
        collection: request.collection,
        hits,
    }))
}

// ============================================================================
// Optional engines
// ============================================================================

pub async fn audio_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<AudioEngine>> {
    let engine = component::<AudioEngine>(&state, AUDIO_ENGINE).await?;
    Ok(Json(engine.as_ref().clone()))
}

pub async fn image_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<ImageEngine>> {
    let engine = component::<ImageEngine>(&state, IMAGE_ENGINE).await?;
    Ok(Json(engine.as_ref().clone()))
}

pub async fn web_search_config(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<WebSearchEngine>> {
    let engine = component::<WebSearchEngine>(&state, WEB_SEARCH).await?;
    Ok(Json(engine.as_ref().clone()))
}

// ============================================================================
// Debug
// ============================================================================

/// Process memory and registry counters.
pub async fn debug_memory(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (rss_mb, vms_mb) = match process_memory().await {
        Some((rss, vms)) => (Some(rss), Some(vms)),
        None => (None, None),
    };

    Json(MemoryResponse {
        rss_mb,
        vms_mb,
        registry: state.registry.stats(),
        worker_state: state.lifecycle.state(),
        in_flight: state.lifecycle.in_flight(),
    })
}

/// `(rss, vms)` in MB from `/proc/self/statm`.
async fn process_memory() -> Option<(f64, f64)> {
    let statm = tokio::fs::read_to_string("/proc/self/statm").await.ok()?;
    let mut fields = statm.split_whitespace();
    let vms_pages: f64 = fields.next()?.parse().ok()?;
    let rss_pages: f64 = fields.next()?.parse().ok()?;

    let page_size = page_size() as f64;
    let mb = 1024.0 * 1024.0;
    Some((rss_pages * page_size / mb, vms_pages * page_size / mb))
}

#[cfg(unix)]
fn page_size() -> i64 {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as i64,
        _ => 4096,
    }
}

#[cfg(not(unix))]
fn page_size() -> i64 {
    4096
}
