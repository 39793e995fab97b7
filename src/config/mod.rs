//! Configuration module for Leanserve
//!
//! Handles loading and layering configuration from multiple sources:
//! - Default values
//! - Configuration file (TOML, YAML or JSON)
//! - Environment variables
//! - Command-line overrides
//!
//! The layered [`Config`] is mutable while it is being assembled. Once
//! assembled it is resolved exactly once into an immutable
//! [`ConfigSnapshot`], which is what every other component receives.

pub mod snapshot;

pub use snapshot::{ConfigSnapshot, FlagValue, LogFormat};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "LEANSERVE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional feature switches
    pub features: FeatureConfig,

    /// Retrieval tuning
    pub retrieval: RetrievalConfig,

    /// Bind address and worker pool sizing
    pub server: ServerConfig,

    /// Worker recycling
    pub lifecycle: LifecycleConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Feature flags. Every feature defaults to enabled unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Skip embedding and retrieval entirely
    pub bypass_embedding_and_retrieval: bool,

    /// Disable background services (audio processing)
    pub disable_background_services: bool,

    /// Image generation route group
    pub enable_image_generation: bool,

    /// Web search route group
    pub enable_web_search: bool,

    /// Web search results are returned without embedding them
    pub bypass_web_search_embedding_and_retrieval: bool,

    /// HTTP request tracing
    pub enable_otel: bool,

    /// Users may use speech-to-text
    pub user_permissions_chat_stt: bool,

    /// Users may use text-to-speech
    pub user_permissions_chat_tts: bool,

    /// Memory diagnostics endpoint
    pub enable_debug_endpoints: bool,

    /// Build heavy components on first use instead of at worker start
    pub lazy_load_models: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            bypass_embedding_and_retrieval: false,
            disable_background_services: false,
            enable_image_generation: true,
            enable_web_search: true,
            bypass_web_search_embedding_and_retrieval: false,
            enable_otel: true,
            user_permissions_chat_stt: true,
            user_permissions_chat_tts: true,
            enable_debug_endpoints: false,
            lazy_load_models: true,
        }
    }
}

/// Retrieval tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Vector database backend name
    pub vector_db: String,

    /// Qdrant multitenancy mode
    pub enable_qdrant_multitenancy_mode: bool,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector width
    pub embedding_dimensions: usize,

    /// Characters per chunk
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,

    /// Results returned per query
    pub top_k: usize,

    /// Maximum document size in megabytes
    pub file_max_size_mb: Option<u64>,

    /// Maximum documents per upload
    pub file_max_count: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_db: "chroma".to_string(),
            enable_qdrant_multitenancy_mode: false,
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            embedding_dimensions: 384,
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 3,
            file_max_size_mb: None,
            file_max_count: None,
        }
    }
}

/// Bind address and worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Explicit worker count; wins over CPU-based sizing
    pub workers: Option<i64>,

    /// Runtime threads per worker
    pub threads: usize,

    /// Workers per CPU core
    pub workers_per_core: f64,

    /// Minimum worker count
    pub min_workers: usize,

    /// Run the multi-process pool; false serves from a single process
    pub use_worker_pool: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
            threads: 1,
            workers_per_core: 0.5,
            min_workers: 2,
            use_worker_pool: true,
        }
    }
}

/// Worker recycling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Requests served before a worker is recycled (0 disables recycling)
    pub max_requests: u64,

    /// Random offset applied to `max_requests` per worker
    pub max_requests_jitter: u64,

    /// How long a draining worker may finish in-flight requests
    #[serde(with = "humantime_serde")]
    pub graceful_timeout: Duration,

    /// Concurrent requests a worker accepts
    pub worker_connections: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            max_requests_jitter: 50,
            graceful_timeout: Duration::from_secs(30),
            worker_connections: 1000,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: String,

    /// Force debug logging
    pub debug: bool,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
            format: LogFormat::Text,
        }
    }
}

/// Overrides collected from the command line. They are applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Bind host
    pub host: Option<String>,
    /// Bind port
    pub port: Option<u16>,
    /// Worker count
    pub workers: Option<i64>,
    /// Threads per worker
    pub threads: Option<usize>,
    /// Force the single-process fallback
    pub single_process: bool,
}

impl Config {
    /// Load configuration from the file and environment layers.
    ///
    /// CLI overrides are applied separately with [`Config::apply_overrides`].
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = Self::find_config_file(config_path) {
            debug!("Loading configuration from {}", path.display());
            config = config.merge_from_file(&path)?;
        }

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Locate the configuration file to use, if any.
    ///
    /// An explicit path (flag or `LEANSERVE_CONFIG`) is returned even when
    /// it does not exist so that reading it reports the error.
    fn find_config_file(explicit_path: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = explicit_path {
            return Some(path.clone());
        }

        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(env_config));
        }

        let mut candidates = vec![PathBuf::from("leanserve.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("leanserve").join("config.toml"));
        }

        candidates.into_iter().find(|p| p.exists())
    }

    /// Merge configuration from a file. Only keys present in the file
    /// replace the current values.
    pub fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                path.display().to_string(),
                format!("failed to read config file: {}", e),
            )
        })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parse_error = |e: String| Error::config(path.display().to_string(), e);

        let layer: serde_json::Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            _ => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        };

        self.merge(layer)
            .map_err(|e| parse_error(format!("invalid configuration: {}", e)))
    }

    /// Deep-merge a partial configuration document into this one.
    fn merge(&self, layer: serde_json::Value) -> std::result::Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        merge_values(&mut base, layer);
        serde_json::from_value(base)
    }

    /// Apply environment variable overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply environment variable overrides from an arbitrary lookup.
    ///
    /// Unparsable values are configuration errors rather than being
    /// silently ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };

        // Features
        let f = &mut self.features;
        env.bool("BYPASS_EMBEDDING_AND_RETRIEVAL", &mut f.bypass_embedding_and_retrieval)?;
        env.bool("DISABLE_BACKGROUND_SERVICES", &mut f.disable_background_services)?;
        env.bool("ENABLE_IMAGE_GENERATION", &mut f.enable_image_generation)?;
        env.bool("ENABLE_WEB_SEARCH", &mut f.enable_web_search)?;
        env.bool(
            "BYPASS_WEB_SEARCH_EMBEDDING_AND_RETRIEVAL",
            &mut f.bypass_web_search_embedding_and_retrieval,
        )?;
        env.bool("ENABLE_OTEL", &mut f.enable_otel)?;
        env.bool("USER_PERMISSIONS_CHAT_STT", &mut f.user_permissions_chat_stt)?;
        env.bool("USER_PERMISSIONS_CHAT_TTS", &mut f.user_permissions_chat_tts)?;
        env.bool("ENABLE_DEBUG_ENDPOINTS", &mut f.enable_debug_endpoints)?;
        env.bool("LAZY_LOAD_MODELS", &mut f.lazy_load_models)?;

        // Retrieval
        let r = &mut self.retrieval;
        env.string("VECTOR_DB", &mut r.vector_db);
        env.bool("ENABLE_QDRANT_MULTITENANCY_MODE", &mut r.enable_qdrant_multitenancy_mode)?;
        env.string("RAG_EMBEDDING_MODEL", &mut r.embedding_model);
        env.parse("RAG_EMBEDDING_DIMENSIONS", &mut r.embedding_dimensions)?;
        env.parse("CHUNK_SIZE", &mut r.chunk_size)?;
        env.parse("CHUNK_OVERLAP", &mut r.chunk_overlap)?;
        env.parse("RAG_TOP_K", &mut r.top_k)?;
        env.parse_opt("RAG_FILE_MAX_SIZE", &mut r.file_max_size_mb)?;
        env.parse_opt("RAG_FILE_MAX_COUNT", &mut r.file_max_count)?;

        // Server
        let s = &mut self.server;
        env.string("HOST", &mut s.host);
        env.parse("PORT", &mut s.port)?;
        env.parse_opt("WEB_CONCURRENCY", &mut s.workers)?;
        env.parse("THREADS", &mut s.threads)?;
        env.parse("WORKERS_PER_CORE", &mut s.workers_per_core)?;
        env.parse("MIN_WORKERS", &mut s.min_workers)?;
        env.bool("USE_WORKER_POOL", &mut s.use_worker_pool)?;

        // Lifecycle
        let l = &mut self.lifecycle;
        env.parse("MAX_REQUESTS", &mut l.max_requests)?;
        env.parse("MAX_REQUESTS_JITTER", &mut l.max_requests_jitter)?;
        let mut graceful_secs = l.graceful_timeout.as_secs();
        if env.parse("GRACEFUL_TIMEOUT", &mut graceful_secs)? {
            l.graceful_timeout = Duration::from_secs(graceful_secs);
        }
        env.parse("WORKER_CONNECTIONS", &mut l.worker_connections)?;

        // Logging
        let g = &mut self.logging;
        env.string("LOG_LEVEL", &mut g.level);
        env.bool("SERVER_DEBUG", &mut g.debug)?;
        if let Some(format) = lookup("LOG_FORMAT") {
            g.format = format.parse()?;
        }

        Ok(())
    }

    /// Apply command-line overrides on top of every other layer.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(workers) = overrides.workers {
            self.server.workers = Some(workers);
        }
        if let Some(threads) = overrides.threads {
            self.server.threads = threads;
        }
        if overrides.single_process {
            self.server.use_worker_pool = false;
        }
    }

    /// Validate and freeze this configuration.
    pub fn resolve(&self) -> Result<ConfigSnapshot> {
        ConfigSnapshot::from_config(self)
    }
}

/// Recursively overlay `layer` onto `base`. Objects merge key by key,
/// anything else replaces.
fn merge_values(base: &mut serde_json::Value, layer: serde_json::Value) {
    match (base, layer) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Parse a boolean flag the way operators write them in environment files.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, name: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(name) {
            *target = value;
        }
    }

    fn bool(&self, name: &str, target: &mut bool) -> Result<()> {
        if let Some(value) = (self.lookup)(name) {
            *target = parse_bool(&value)
                .ok_or_else(|| Error::config(name, format!("expected a boolean, got '{}'", value)))?;
        }
        Ok(())
    }

    /// Returns whether the variable was set.
    fn parse<T>(&self, name: &str, target: &mut T) -> Result<bool>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = (self.lookup)(name) else {
            return Ok(false);
        };
        *target = value
            .trim()
            .parse()
            .map_err(|e| Error::config(name, format!("invalid value '{}': {}", value, e)))?;
        Ok(true)
    }

    fn parse_opt<T>(&self, name: &str, target: &mut Option<T>) -> Result<()>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = (self.lookup)(name) {
            if value.trim().is_empty() {
                *target = None;
            } else {
                *target = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|e| Error::config(name, format!("invalid value '{}': {}", value, e)))?,
                );
            }
        }
        Ok(())
    }
}
