//! Request and response bodies.

use serde::{Deserialize, Serialize};

use super::routes::RouteGroup;
use crate::components::SearchHit;
use crate::pool::{WorkerRecord, WorkerState};
use crate::startup::{ComponentKey, ComponentState, RegistryStats};

// ============================================================================
// Core
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub worker: String,
}

/// One endpoint served by this worker.
#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub method: &'static str,
    pub path: &'static str,
}

/// A registered component and its build state.
#[derive(Debug, Serialize)]
pub struct ComponentInfo {
    pub key: ComponentKey,
    pub state: ComponentState,
}

/// Worker info response.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub groups: Vec<RouteGroup>,
    pub endpoints: Vec<EndpointInfo>,
    pub components: Vec<ComponentInfo>,
    pub worker: WorkerRecord,
}

// ============================================================================
// Retrieval
// ============================================================================

fn default_collection() -> String {
    "default".to_string()
}

/// A document to ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
}

/// Ingest request.
#[derive(Debug, Deserialize)]
pub struct AddDocumentsRequest {
    #[serde(default = "default_collection")]
    pub collection: String,
    pub documents: Vec<DocumentInput>,
}

/// Ingest response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddDocumentsResponse {
    pub collection: String,
    pub documents: usize,
    pub chunks: usize,
    /// Chunks in the collection after ingestion
    pub total_chunks: usize,
}

/// Query request.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default = "default_collection")]
    pub collection: String,
    pub query: String,
    /// Overrides the configured top-k
    #[serde(default)]
    pub k: Option<usize>,
}

/// Query response.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub collection: String,
    pub hits: Vec<SearchHit>,
}

// ============================================================================
// Debug
// ============================================================================

/// Memory diagnostics response.
#[derive(Debug, Serialize)]
pub struct MemoryResponse {
    /// Resident set size in MB, when the platform reports it
    pub rss_mb: Option<f64>,
    /// Virtual memory size in MB, when the platform reports it
    pub vms_mb: Option<f64>,
    pub registry: RegistryStats,
    pub worker_state: WorkerState,
    pub in_flight: usize,
}
