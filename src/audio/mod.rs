//! Microphone capture and speaker playback.

pub mod capture;
pub mod playback;

pub use capture::MicCapture;
pub use playback::SpeakerSink;

/// A fixed-size frame of mono PCM from the microphone.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Signed 16-bit samples at the device's native rate.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}
