//! Configuration types for the kiosk runtime and brain server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KioskError, Result};

/// Top-level configuration for the kiosk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Microphone capture settings.
    pub audio: AudioConfig,
    /// Speech-to-text relay and fallback settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Voice runtime timers and policies.
    pub voice: VoiceConfig,
    /// Brain endpoints and LLM provider settings.
    pub brain: BrainConfig,
    /// Brain HTTP server settings.
    pub server: ServerConfig,
    /// Flow behavior toggles.
    pub flow: FlowConfig,
}

impl KioskConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| KioskError::Config(format!("{}: {e}", p.display())))?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    ///
    /// Injected rather than read directly so tests can pass a map.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("DEEPGRAM_MODEL") {
            self.stt.model = v;
        }
        if let Some(v) = get("DEEPGRAM_LANGUAGE") {
            self.stt.language = v;
        }
        if let Some(v) = get("DEEPGRAM_ENDPOINTING_MS").and_then(|v| v.parse().ok()) {
            self.stt.endpointing_ms = v;
        }
        if let Some(v) = get("DEEPGRAM_UTTERANCE_END_MS").and_then(|v| v.parse().ok()) {
            self.stt.utterance_end_ms = v;
        }
        if let Some(v) = get("STT_PROVIDER").and_then(|v| v.parse().ok()) {
            self.stt.provider = v;
        }
        if let Some(v) = get("ENABLE_FALLBACK_STT").map(|v| v == "1" || v == "true") {
            self.stt.enable_fallback = v;
        }
        if let Some(v) = get("STT_RELAY_URL") {
            self.stt.relay_url = v;
        }
        if let Some(v) = get("TTS_LANG_PRIORITY") {
            self.tts.lang_priority = v.split(',').map(|s| s.trim().to_owned()).collect();
        }
        if let Some(v) = get("MIN_TRANSCRIPT_CONFIDENCE").and_then(|v| v.parse().ok()) {
            self.voice.min_transcript_confidence = v;
        }
        if let Some(v) = get("NO_SPEECH_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.voice.no_speech_timeout_ms = v;
        }
        if let Some(v) = get("GROQ_API_KEY") {
            self.brain.llm_api_key = v;
        }
        if let Some(v) = get("GROQ_API_URL") {
            self.brain.llm_api_url = v;
        }
        if let Some(v) = get("GROQ_MODEL") {
            self.brain.llm_model = v;
        }
        if let Some(v) = get("BRAIN_BASE_URL") {
            self.brain.base_url = v;
        }
        if let Some(v) = get("TENANT_SLUG") {
            self.brain.tenant_slug = v;
        }
        if let Some(v) = get("HTTP_PORT").or_else(|| get("PORT")) {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.server.db_path = PathBuf::from(v);
        }
    }

    /// Reject configurations that cannot possibly run.
    fn validate(&self) -> Result<()> {
        if self.voice.max_silent_turns <= self.voice.warn_silent_turns {
            return Err(KioskError::Config(
                "max_silent_turns must exceed warn_silent_turns".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.voice.min_transcript_confidence) {
            return Err(KioskError::Config(
                "min_transcript_confidence must be in 0..=1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Microphone capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Fixed frame size handed to the STT stream, in samples.
    pub chunk_samples: usize,
    /// Acquisition hints passed to the platform capture layer.
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            chunk_samples: 2048,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain: true,
        }
    }
}

/// Which STT provider the voice runtime starts with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// Server-side relay holding the provider credential.
    #[default]
    Relay,
    /// On-device recognizer used when the relay is unavailable.
    Fallback,
}

impl std::str::FromStr for SttProvider {
    type Err = KioskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relay" | "deepgram" => Ok(Self::Relay),
            "fallback" | "webspeech" => Ok(Self::Fallback),
            other => Err(KioskError::Config(format!("unknown STT provider '{other}'"))),
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Initial provider.
    pub provider: SttProvider,
    /// Whether to fail over to the on-device recognizer on relay error.
    pub enable_fallback: bool,
    /// WebSocket URL of the STT relay.
    pub relay_url: String,
    /// Provider model name, forwarded by the relay.
    pub model: String,
    /// BCP-47 language tag sent in the session query.
    pub language: String,
    /// Provider endpointing window in ms.
    pub endpointing_ms: u32,
    /// Provider utterance-end window in ms.
    pub utterance_end_ms: u32,
    /// Promote a stale partial to final after this long without updates.
    pub partial_promotion_ms: u64,
    /// Fallback recognizer: coalesce final fragments inside this grace.
    pub final_debounce_ms: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: SttProvider::Relay,
            enable_fallback: true,
            relay_url: "ws://127.0.0.1:8090/stt".to_owned(),
            model: "nova-2".to_owned(),
            language: "en".to_owned(),
            endpointing_ms: 300,
            utterance_end_ms: 1_000,
            partial_promotion_ms: 2_000,
            final_debounce_ms: 250,
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Locale priority for voice selection, best first.
    pub lang_priority: Vec<String>,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            lang_priority: vec!["en-IN".to_owned(), "en-GB".to_owned(), "en-US".to_owned()],
            sample_rate: 24_000,
            output_device: None,
        }
    }
}

/// Voice runtime timers and input policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Abort the turn if no interim arrives within this window.
    pub no_speech_timeout_ms: u64,
    /// Abort the turn if no final arrives within this window.
    pub no_result_timeout_ms: u64,
    /// Hard cap on one listening session.
    pub max_session_ms: u64,
    /// Any-activity stall detector.
    pub watchdog_ms: u64,
    /// Consecutive silent turns before the spoken nudge.
    pub warn_silent_turns: u32,
    /// Consecutive silent turns before the session aborts.
    pub max_silent_turns: u32,
    /// Reject transcripts below this confidence unless keyword-rescued.
    pub min_transcript_confidence: f32,
    /// Reject transcripts shorter than this many characters.
    pub min_transcript_chars: usize,
    /// Sliding-window cap on voice session starts per 60 s.
    pub max_session_starts_per_minute: u32,
    /// Return to IDLE after this long without any guest activity.
    pub inactivity_timeout_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            no_speech_timeout_ms: 8_000,
            no_result_timeout_ms: 12_000,
            max_session_ms: 30_000,
            watchdog_ms: 20_000,
            warn_silent_turns: 2,
            max_silent_turns: 3,
            min_transcript_confidence: 0.2,
            min_transcript_chars: 2,
            max_session_starts_per_minute: 5,
            inactivity_timeout_ms: 120_000,
        }
    }
}

/// Brain endpoints and LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Tenant this kiosk is provisioned for.
    pub tenant_slug: String,
    /// Base URL of the brain server, as seen from the kiosk front runtime.
    pub base_url: String,
    /// OpenAI-compatible chat completions endpoint of the LLM provider.
    pub llm_api_url: String,
    /// Provider API key. Never ships to the kiosk front.
    pub llm_api_key: String,
    /// Provider model id.
    pub llm_model: String,
    /// Sampling temperature. Slot filling needs determinism.
    pub temperature: f32,
    /// Messages retained per chat session (user + assistant).
    pub history_cap: usize,
    /// History messages included in each LLM prompt.
    pub prompt_history: usize,
    /// Per-request timeout for LLM calls, in ms.
    pub llm_timeout_ms: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            tenant_slug: "grand-hotel".to_owned(),
            base_url: "http://127.0.0.1:8080".to_owned(),
            llm_api_url: "https://api.groq.com/openai/v1/chat/completions".to_owned(),
            llm_api_key: String::new(),
            llm_model: "llama-3.3-70b-versatile".to_owned(),
            temperature: 0.0,
            history_cap: 12,
            prompt_history: 6,
            llm_timeout_ms: 10_000,
        }
    }
}

/// Brain HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database path.
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            db_path: PathBuf::from("atrium.db"),
        }
    }
}

/// Flow behavior toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// When set, KEY_DISPENSING auto-advances to COMPLETE after this many
    /// ms without a hardware event. Demo/test affordance, off by default.
    pub dispense_auto_advance_ms: Option<u64>,
}
