//! Error types for the kiosk runtime.

/// Top-level error type for the kiosk system.
#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    /// Microphone or speaker device/stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text relay or recognizer error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech synthesis or playback error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Voice runtime coordination error.
    #[error("voice error: {0}")]
    Voice(String),

    /// LLM provider call or reply-shape error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Brain endpoint error (chat / booking HTTP surface).
    #[error("brain error: {0}")]
    Brain(String),

    /// Booking store error.
    #[error("store error: {0}")]
    Store(String),

    /// A confirmed booking already occupies the requested dates.
    #[error("booking date conflict: {0}")]
    BookingConflict(String),

    /// Tenant slug did not resolve.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, KioskError>;
