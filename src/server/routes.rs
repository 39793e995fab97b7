//! Conditional route mounting.
//!
//! Optional route groups are attached only when every gate they declare
//! holds against the resolved snapshot. The decision is taken once per
//! worker; an unmounted group registers no component factories, so its
//! subsystems are never constructed and its paths answer 404.

use std::fmt;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tracing::debug;

use super::handlers;
use super::state::AppState;
use crate::components::{self, AUDIO_ENGINE, EMBEDDING_FN, IMAGE_ENGINE, VECTOR_STORE, WEB_SEARCH};
use crate::config::ConfigSnapshot;
use crate::error::Result;
use crate::startup::LazyComponentRegistry;

/// A condition a route group needs before it is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    /// Embedding and retrieval are not bypassed
    RetrievalEnabled,
    /// Background services are enabled
    BackgroundServices,
    /// Speech-to-text or text-to-speech is permitted
    SpeechPermission,
    ImageGeneration,
    WebSearch,
    DebugEndpoints,
}

impl Gate {
    /// Evaluate the gate.
    pub fn holds(&self, snapshot: &ConfigSnapshot) -> bool {
        match self {
            Gate::RetrievalEnabled => !snapshot.retrieval_bypassed(),
            Gate::BackgroundServices => snapshot.background_services(),
            Gate::SpeechPermission => snapshot.speech_to_text() || snapshot.text_to_speech(),
            Gate::ImageGeneration => snapshot.image_generation(),
            Gate::WebSearch => snapshot.web_search(),
            Gate::DebugEndpoints => snapshot.debug_endpoints(),
        }
    }

    /// The flag(s) controlling this gate.
    pub fn flag(&self) -> &'static str {
        match self {
            Gate::RetrievalEnabled => "BYPASS_EMBEDDING_AND_RETRIEVAL",
            Gate::BackgroundServices => "DISABLE_BACKGROUND_SERVICES",
            Gate::SpeechPermission => "USER_PERMISSIONS_CHAT_STT|USER_PERMISSIONS_CHAT_TTS",
            Gate::ImageGeneration => "ENABLE_IMAGE_GENERATION",
            Gate::WebSearch => "ENABLE_WEB_SEARCH",
            Gate::DebugEndpoints => "ENABLE_DEBUG_ENDPOINTS",
        }
    }
}

/// Route groups, in mount order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteGroup {
    Core,
    Retrieval,
    Audio,
    Images,
    WebSearch,
    Debug,
}

impl RouteGroup {
    pub const ALL: [RouteGroup; 6] = [
        RouteGroup::Core,
        RouteGroup::Retrieval,
        RouteGroup::Audio,
        RouteGroup::Images,
        RouteGroup::WebSearch,
        RouteGroup::Debug,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RouteGroup::Core => "core",
            RouteGroup::Retrieval => "retrieval",
            RouteGroup::Audio => "audio",
            RouteGroup::Images => "images",
            RouteGroup::WebSearch => "web_search",
            RouteGroup::Debug => "debug",
        }
    }

    /// Gates that must all hold for the group to be mounted.
    pub fn gates(&self) -> &'static [Gate] {
        match self {
            RouteGroup::Core => &[],
            RouteGroup::Retrieval => &[Gate::RetrievalEnabled],
            RouteGroup::Audio => &[Gate::BackgroundServices, Gate::SpeechPermission],
            RouteGroup::Images => &[Gate::ImageGeneration],
            RouteGroup::WebSearch => &[Gate::WebSearch],
            RouteGroup::Debug => &[Gate::DebugEndpoints],
        }
    }

    /// Components the group's handlers resolve.
    pub fn components(&self) -> &'static [&'static str] {
        match self {
            RouteGroup::Retrieval => &[VECTOR_STORE, EMBEDDING_FN],
            RouteGroup::Audio => &[AUDIO_ENGINE],
            RouteGroup::Images => &[IMAGE_ENGINE],
            RouteGroup::WebSearch => &[WEB_SEARCH],
            RouteGroup::Core | RouteGroup::Debug => &[],
        }
    }

    /// `(method, path)` of every endpoint the group serves.
    pub fn endpoints(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            RouteGroup::Core => &[("GET", "/health"), ("GET", "/api/v1/info")],
            RouteGroup::Retrieval => &[
                ("POST", "/api/v1/retrieval/documents"),
                ("POST", "/api/v1/retrieval/query"),
            ],
            RouteGroup::Audio => &[("GET", "/api/v1/audio/config")],
            RouteGroup::Images => &[("GET", "/api/v1/images/config")],
            RouteGroup::WebSearch => &[("GET", "/api/v1/web-search/config")],
            RouteGroup::Debug => &[("GET", "/api/v1/debug/memory")],
        }
    }

    fn register_components(
        &self,
        registry: &LazyComponentRegistry,
        snapshot: &Arc<ConfigSnapshot>,
    ) -> Result<()> {
        match self {
            RouteGroup::Retrieval => components::register_retrieval(registry, snapshot),
            RouteGroup::Audio => components::register_audio(registry, snapshot),
            RouteGroup::Images => components::register_images(registry, snapshot),
            RouteGroup::WebSearch => components::register_web_search(registry, snapshot),
            RouteGroup::Core | RouteGroup::Debug => Ok(()),
        }
    }

    /// API routes under `/api/v1`.
    fn api_routes(&self) -> Router<Arc<AppState>> {
        match self {
            RouteGroup::Core => Router::new().route("/info", get(handlers::info)),
            RouteGroup::Retrieval => Router::new()
                .route("/retrieval/documents", post(handlers::add_documents))
                .route("/retrieval/query", post(handlers::query)),
            RouteGroup::Audio => Router::new().route("/audio/config", get(handlers::audio_config)),
            RouteGroup::Images => {
                Router::new().route("/images/config", get(handlers::image_config))
            }
            RouteGroup::WebSearch => {
                Router::new().route("/web-search/config", get(handlers::web_search_config))
            }
            RouteGroup::Debug => Router::new().route("/debug/memory", get(handlers::debug_memory)),
        }
    }
}

impl fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mount decision for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDecision {
    pub group: RouteGroup,
    pub mounted: bool,
    /// Gates that did not hold
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<Gate>,
}

/// Which route groups this worker mounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MountPlan {
    decisions: Vec<GroupDecision>,
}

impl MountPlan {
    /// Decide every group against `snapshot`.
    pub fn resolve(snapshot: &ConfigSnapshot) -> Self {
        let decisions = RouteGroup::ALL
            .iter()
            .map(|&group| {
                let blocked_by: Vec<Gate> = group
                    .gates()
                    .iter()
                    .copied()
                    .filter(|gate| !gate.holds(snapshot))
                    .collect();
                let mounted = blocked_by.is_empty();
                debug!(group = %group, mounted, blocked_by = ?blocked_by, "Route group decision");
                GroupDecision {
                    group,
                    mounted,
                    blocked_by,
                }
            })
            .collect();
        Self { decisions }
    }

    pub fn is_mounted(&self, group: RouteGroup) -> bool {
        self.decisions
            .iter()
            .any(|d| d.group == group && d.mounted)
    }

    /// Mounted groups, in mount order.
    pub fn groups(&self) -> impl Iterator<Item = RouteGroup> + '_ {
        self.decisions
            .iter()
            .filter(|d| d.mounted)
            .map(|d| d.group)
    }

    pub fn decisions(&self) -> &[GroupDecision] {
        &self.decisions
    }

    /// Component keys owned by mounted groups.
    pub fn component_keys(&self) -> Vec<&'static str> {
        self.groups()
            .flat_map(|g| g.components().iter().copied())
            .collect()
    }

    /// Register factories for the mounted groups only.
    pub fn register_components(
        &self,
        registry: &LazyComponentRegistry,
        snapshot: &Arc<ConfigSnapshot>,
    ) -> Result<()> {
        for group in self.groups() {
            group.register_components(registry, snapshot)?;
        }
        Ok(())
    }

    /// Build the router from the mounted groups.
    pub fn router(&self, state: Arc<AppState>) -> Router {
        let api = self
            .groups()
            .fold(Router::new(), |api, group| api.merge(group.api_routes()));

        Router::new()
            .route("/health", get(handlers::health_check))
            .nest("/api/v1", api)
            .with_state(state)
    }
}
