//! Optional feature engines: speech, image generation and web search.
//!
//! Each engine is built from the snapshot the first time its route group is
//! used. Building one validates that the feature can actually run in this
//! worker and fixes its effective settings.

use serde::Serialize;

use super::ComponentError;
use crate::config::ConfigSnapshot;

/// Speech-to-text and text-to-speech engine.
#[derive(Debug, Clone, Serialize)]
pub struct AudioEngine {
    pub stt_enabled: bool,
    pub tts_enabled: bool,
    pub stt_engine: &'static str,
    pub tts_engine: &'static str,
}

impl AudioEngine {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self, ComponentError> {
        if !snapshot.background_services() {
            return Err(ComponentError::Disabled("background services"));
        }
        if !(snapshot.speech_to_text() || snapshot.text_to_speech()) {
            return Err(ComponentError::Disabled("speech permissions"));
        }
        Ok(Self {
            stt_enabled: snapshot.speech_to_text(),
            tts_enabled: snapshot.text_to_speech(),
            stt_engine: "whisper",
            tts_engine: "piper",
        })
    }
}

/// Image generation engine.
#[derive(Debug, Clone, Serialize)]
pub struct ImageEngine {
    pub engine: &'static str,
    pub size: &'static str,
    pub steps: u32,
}

impl ImageEngine {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self, ComponentError> {
        if !snapshot.image_generation() {
            return Err(ComponentError::Disabled("image generation"));
        }
        Ok(Self {
            engine: "openai",
            size: "512x512",
            steps: 50,
        })
    }
}

/// Web search engine.
#[derive(Debug, Clone, Serialize)]
pub struct WebSearchEngine {
    pub engine: &'static str,
    pub result_count: usize,
    /// Results are returned raw instead of being embedded and re-ranked
    pub bypass_embedding: bool,
}

impl WebSearchEngine {
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self, ComponentError> {
        if !snapshot.web_search() {
            return Err(ComponentError::Disabled("web search"));
        }
        Ok(Self {
            engine: "searxng",
            result_count: snapshot.top_k(),
            bypass_embedding: snapshot.web_search_bypass_embedding()
                || snapshot.retrieval_bypassed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_audio_requires_a_speech_permission() {
        let mut config = Config::default();
        config.features.user_permissions_chat_stt = false;
        config.features.user_permissions_chat_tts = false;
        let snapshot = config.resolve().unwrap();

        assert!(AudioEngine::from_snapshot(&snapshot).is_err());
    }

    #[test]
    fn test_audio_reflects_permissions() {
        let mut config = Config::default();
        config.features.user_permissions_chat_tts = false;
        let engine = AudioEngine::from_snapshot(&config.resolve().unwrap()).unwrap();

        assert!(engine.stt_enabled);
        assert!(!engine.tts_enabled);
    }

    #[test]
    fn test_web_search_inherits_retrieval_bypass() {
        let mut config = Config::default();
        config.features.bypass_embedding_and_retrieval = true;
        let engine = WebSearchEngine::from_snapshot(&config.resolve().unwrap()).unwrap();

        assert!(engine.bypass_embedding);
        assert_eq!(engine.result_count, 3);
    }
}
