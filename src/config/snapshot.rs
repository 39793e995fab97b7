//! The immutable, resolved view of configuration.
//!
//! A [`ConfigSnapshot`] is produced once at process start by
//! [`Config::resolve`](super::Config::resolve) and shared behind an `Arc`
//! for the lifetime of the process. It is never written after resolution,
//! so readers need no synchronization.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::Config;
use crate::components::VectorBackend;
use crate::error::{Error, Result};
use crate::pool::{PoolSizing, RecyclePolicy};

/// A single resolved flag value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean switch
    Bool(bool),
    /// Numeric tuning value
    Int(i64),
    /// Free-form value
    Str(String),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(
                "LOG_FORMAT",
                format!("expected 'text' or 'json', got '{}'", other),
            )),
        }
    }
}

/// Immutable resolved configuration.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    // Features
    retrieval_bypassed: bool,
    background_services: bool,
    image_generation: bool,
    web_search: bool,
    web_search_bypass_embedding: bool,
    telemetry: bool,
    speech_to_text: bool,
    text_to_speech: bool,
    debug_endpoints: bool,
    lazy_load: bool,

    // Retrieval
    vector_backend: VectorBackend,
    qdrant_multitenancy: bool,
    embedding_model: String,
    embedding_dimensions: usize,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    file_max_size_mb: Option<u64>,
    file_max_count: Option<usize>,

    // Server
    host: String,
    port: u16,
    workers_override: Option<usize>,
    threads: usize,
    sizing: PoolSizing,
    use_worker_pool: bool,

    // Lifecycle
    recycle: RecyclePolicy,

    // Logging
    log_level: String,
    log_format: LogFormat,
}

impl ConfigSnapshot {
    /// Validate a layered configuration and freeze it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let f = &config.features;
        let r = &config.retrieval;
        let s = &config.server;
        let l = &config.lifecycle;

        let workers_override = match s.workers {
            None => None,
            Some(n) if n <= 0 => {
                return Err(Error::config(
                    "WEB_CONCURRENCY",
                    format!("worker count override must be at least 1, got {}", n),
                ))
            }
            Some(n) => Some(n as usize),
        };

        if s.threads == 0 {
            return Err(Error::config("THREADS", "threads per worker must be at least 1"));
        }
        if s.min_workers == 0 {
            return Err(Error::config("MIN_WORKERS", "minimum worker count must be at least 1"));
        }
        if !(s.workers_per_core.is_finite() && s.workers_per_core > 0.0) {
            return Err(Error::config(
                "WORKERS_PER_CORE",
                format!("must be a positive number, got {}", s.workers_per_core),
            ));
        }
        if r.chunk_size == 0 {
            return Err(Error::config("CHUNK_SIZE", "chunk size must be at least 1"));
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(Error::config(
                "CHUNK_OVERLAP",
                format!(
                    "overlap ({}) must be smaller than the chunk size ({})",
                    r.chunk_overlap, r.chunk_size
                ),
            ));
        }
        if r.top_k == 0 {
            return Err(Error::config("RAG_TOP_K", "top-k must be at least 1"));
        }
        if r.embedding_dimensions == 0 {
            return Err(Error::config(
                "RAG_EMBEDDING_DIMENSIONS",
                "embedding dimensions must be at least 1",
            ));
        }
        if l.max_requests > 0 && l.max_requests_jitter > l.max_requests {
            return Err(Error::config(
                "MAX_REQUESTS_JITTER",
                format!(
                    "jitter ({}) may not exceed max requests ({})",
                    l.max_requests_jitter, l.max_requests
                ),
            ));
        }
        if l.worker_connections == 0 {
            return Err(Error::config(
                "WORKER_CONNECTIONS",
                "worker connections must be at least 1",
            ));
        }

        let vector_backend: VectorBackend = r.vector_db.parse()?;

        let log_level = if config.logging.debug {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        };

        Ok(Self {
            retrieval_bypassed: f.bypass_embedding_and_retrieval,
            background_services: !f.disable_background_services,
            image_generation: f.enable_image_generation,
            web_search: f.enable_web_search,
            web_search_bypass_embedding: f.bypass_web_search_embedding_and_retrieval,
            telemetry: f.enable_otel,
            speech_to_text: f.user_permissions_chat_stt,
            text_to_speech: f.user_permissions_chat_tts,
            debug_endpoints: f.enable_debug_endpoints,
            lazy_load: f.lazy_load_models,
            vector_backend,
            qdrant_multitenancy: r.enable_qdrant_multitenancy_mode,
            embedding_model: r.embedding_model.clone(),
            embedding_dimensions: r.embedding_dimensions,
            chunk_size: r.chunk_size,
            chunk_overlap: r.chunk_overlap,
            top_k: r.top_k,
            file_max_size_mb: r.file_max_size_mb,
            file_max_count: r.file_max_count,
            host: s.host.clone(),
            port: s.port,
            workers_override,
            threads: s.threads,
            sizing: PoolSizing {
                floor: s.min_workers,
                fraction: s.workers_per_core,
            },
            use_worker_pool: s.use_worker_pool,
            recycle: RecyclePolicy {
                base_max_requests: l.max_requests,
                jitter: l.max_requests_jitter,
                grace_period: l.graceful_timeout,
                max_concurrent: l.worker_connections,
            },
            log_level,
            log_format: config.logging.format,
        })
    }

    /// Whether embedding and retrieval are bypassed.
    pub fn retrieval_bypassed(&self) -> bool {
        self.retrieval_bypassed
    }

    /// Whether background services run.
    pub fn background_services(&self) -> bool {
        self.background_services
    }

    pub fn image_generation(&self) -> bool {
        self.image_generation
    }

    pub fn web_search(&self) -> bool {
        self.web_search
    }

    /// Whether web search results skip the embedding step.
    pub fn web_search_bypass_embedding(&self) -> bool {
        self.web_search_bypass_embedding
    }

    /// Whether HTTP request tracing is attached.
    pub fn telemetry(&self) -> bool {
        self.telemetry
    }

    pub fn speech_to_text(&self) -> bool {
        self.speech_to_text
    }

    pub fn text_to_speech(&self) -> bool {
        self.text_to_speech
    }

    pub fn debug_endpoints(&self) -> bool {
        self.debug_endpoints
    }

    /// Whether heavy components are built on first use (true) or
    /// prewarmed when the worker starts (false).
    pub fn lazy_load(&self) -> bool {
        self.lazy_load
    }

    pub fn vector_backend(&self) -> VectorBackend {
        self.vector_backend
    }

    pub fn qdrant_multitenancy(&self) -> bool {
        self.qdrant_multitenancy
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Maximum document size in bytes, if limited.
    pub fn file_max_size_bytes(&self) -> Option<u64> {
        self.file_max_size_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }

    pub fn file_max_count(&self) -> Option<usize> {
        self.file_max_count
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Explicit worker count, already validated to be positive.
    pub fn workers_override(&self) -> Option<usize> {
        self.workers_override
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn sizing(&self) -> PoolSizing {
        self.sizing
    }

    /// Whether the multi-process pool runs (false = single process).
    pub fn use_worker_pool(&self) -> bool {
        self.use_worker_pool
    }

    pub fn recycle(&self) -> &RecyclePolicy {
        &self.recycle
    }

    pub fn grace_period(&self) -> Duration {
        self.recycle.grace_period
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Every flag by its environment name, in a stable order.
    pub fn flags(&self) -> IndexMap<&'static str, FlagValue> {
        use FlagValue::{Bool, Int, Str};

        let opt_int = |v: Option<i64>| v.map_or(Str(String::new()), Int);

        let mut flags = IndexMap::new();
        flags.insert("BYPASS_EMBEDDING_AND_RETRIEVAL", Bool(self.retrieval_bypassed));
        flags.insert("DISABLE_BACKGROUND_SERVICES", Bool(!self.background_services));
        flags.insert("ENABLE_IMAGE_GENERATION", Bool(self.image_generation));
        flags.insert("ENABLE_WEB_SEARCH", Bool(self.web_search));
        flags.insert(
            "BYPASS_WEB_SEARCH_EMBEDDING_AND_RETRIEVAL",
            Bool(self.web_search_bypass_embedding),
        );
        flags.insert("ENABLE_OTEL", Bool(self.telemetry));
        flags.insert("USER_PERMISSIONS_CHAT_STT", Bool(self.speech_to_text));
        flags.insert("USER_PERMISSIONS_CHAT_TTS", Bool(self.text_to_speech));
        flags.insert("ENABLE_DEBUG_ENDPOINTS", Bool(self.debug_endpoints));
        flags.insert("LAZY_LOAD_MODELS", Bool(self.lazy_load));
        flags.insert("VECTOR_DB", Str(self.vector_backend.to_string()));
        flags.insert("ENABLE_QDRANT_MULTITENANCY_MODE", Bool(self.qdrant_multitenancy));
        flags.insert("RAG_EMBEDDING_MODEL", Str(self.embedding_model.clone()));
        flags.insert("RAG_EMBEDDING_DIMENSIONS", Int(self.embedding_dimensions as i64));
        flags.insert("CHUNK_SIZE", Int(self.chunk_size as i64));
        flags.insert("CHUNK_OVERLAP", Int(self.chunk_overlap as i64));
        flags.insert("RAG_TOP_K", Int(self.top_k as i64));
        flags.insert("RAG_FILE_MAX_SIZE", opt_int(self.file_max_size_mb.map(|v| v as i64)));
        flags.insert("RAG_FILE_MAX_COUNT", opt_int(self.file_max_count.map(|v| v as i64)));
        flags.insert("HOST", Str(self.host.clone()));
        flags.insert("PORT", Int(i64::from(self.port)));
        flags.insert("WEB_CONCURRENCY", opt_int(self.workers_override.map(|v| v as i64)));
        flags.insert("THREADS", Int(self.threads as i64));
        flags.insert("WORKERS_PER_CORE", Str(self.sizing.fraction.to_string()));
        flags.insert("MIN_WORKERS", Int(self.sizing.floor as i64));
        flags.insert("USE_WORKER_POOL", Bool(self.use_worker_pool));
        flags.insert("MAX_REQUESTS", Int(self.recycle.base_max_requests as i64));
        flags.insert("MAX_REQUESTS_JITTER", Int(self.recycle.jitter as i64));
        flags.insert("GRACEFUL_TIMEOUT", Int(self.recycle.grace_period.as_secs() as i64));
        flags.insert("WORKER_CONNECTIONS", Int(self.recycle.max_concurrent as i64));
        flags.insert("LOG_LEVEL", Str(self.log_level.clone()));
        flags
    }

    /// Look a single flag up by its environment name.
    pub fn get(&self, name: &str) -> Option<FlagValue> {
        self.flags().shift_remove(name)
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        // The default configuration always validates.
        match Config::default().resolve() {
            Ok(snapshot) => snapshot,
            Err(e) => unreachable!("default configuration is invalid: {}", e),
        }
    }
}
