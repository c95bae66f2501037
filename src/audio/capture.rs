//! Microphone audio capture using cpal.
//!
//! Captures at the device's native sample rate and emits fixed-size i16
//! frames for the STT stream. The relay is told the rate in its session
//! query, so no resampling happens on-device. Echo-cancellation, noise
//! suppression and auto-gain are platform hints; cpal exposes no portable
//! toggles for them, so the config flags are advisory.

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PcmFrame;
use crate::config::AudioConfig;
use crate::error::{KioskError, Result};

/// Microphone capture via cpal.
///
/// Emits mono frames of exactly `chunk_samples` i16 samples at the
/// device's native rate. No buffering beyond one frame.
pub struct MicCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    chunk_samples: usize,
}

impl MicCapture {
    /// Create a new capture instance.
    ///
    /// Uses the device's default configuration for maximum compatibility.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available — the kiosk treats
    /// that as a denied microphone permission.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            let requested = host
                .input_devices()
                .map_err(|e| KioskError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| match d.description() {
                    Ok(desc) => desc.name() == name,
                    Err(_) => false,
                });

            match requested {
                Some(device) => device,
                None => {
                    warn!(
                        "configured input device '{}' not found, falling back to default",
                        name
                    );
                    host.default_input_device().ok_or_else(|| {
                        KioskError::Audio("microphone unavailable or permission denied".into())
                    })?
                }
            }
        } else {
            host.default_input_device().ok_or_else(|| {
                KioskError::Audio("microphone unavailable or permission denied".into())
            })?
        };

        let device_name = match device.description() {
            Ok(d) => d.name().to_owned(),
            Err(_) => "<unknown>".into(),
        };
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| KioskError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "native input config: {}Hz, {} channels",
            native_rate, native_channels
        );

        Ok(Self {
            device,
            stream_config,
            chunk_samples: config.chunk_samples.max(1),
        })
    }

    /// The rate frames will carry, as reported by the device.
    pub fn native_sample_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    /// Run the capture loop, sending frames to the provided channel.
    ///
    /// Blocks until the cancellation token is triggered; dropping out of
    /// this function releases the stream and the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created or started.
    pub async fn run(&self, tx: mpsc::Sender<PcmFrame>, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let chunk_len = self.chunk_samples;
        let tx_clone = tx.clone();
        let mut pending: VecDeque<i16> = VecDeque::with_capacity(chunk_len.saturating_mul(4));

        // Rate-limited reporting from the audio callback thread.
        let dropped_full = AtomicU64::new(0);
        let last_report_ms = AtomicU64::new(0);
        let tx_closed = AtomicBool::new(false);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    pending.extend(mono.into_iter().map(f32_to_i16));

                    // Emit fixed-size frames to keep relay pacing consistent.
                    while pending.len() >= chunk_len {
                        if tx_closed.load(Ordering::Relaxed) {
                            pending.clear();
                            break;
                        }

                        let mut out = Vec::with_capacity(chunk_len);
                        for _ in 0..chunk_len {
                            if let Some(s) = pending.pop_front() {
                                out.push(s);
                            }
                        }

                        let frame = PcmFrame {
                            samples: out,
                            sample_rate: native_rate,
                        };
                        // Use try_send to avoid blocking the audio thread
                        match tx_clone.try_send(frame) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_frame)) => {
                                dropped_full.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(mpsc::error::TrySendError::Closed(_frame)) => {
                                tx_closed.store(true, Ordering::Relaxed);
                            }
                        }

                        // Rate-limit logs to avoid spamming.
                        let now_ms = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or(0);
                        let last = last_report_ms.load(Ordering::Relaxed);
                        if now_ms.saturating_sub(last) >= 2_000
                            && last_report_ms
                                .compare_exchange(
                                    last,
                                    now_ms,
                                    Ordering::Relaxed,
                                    Ordering::Relaxed,
                                )
                                .is_ok()
                        {
                            let n = dropped_full.swap(0, Ordering::Relaxed);
                            if tx_closed.load(Ordering::Relaxed) {
                                debug!("audio channel closed (voice session stopped)");
                            } else if n > 0 {
                                debug!("audio channel full, dropped {n} frames (last 2s)");
                            }
                        }
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| KioskError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| KioskError::Audio(format!("failed to start input stream: {e}")))?;

        info!("audio capture started at {native_rate}Hz");

        // Hold the stream alive until cancelled
        cancel.cancelled().await;

        drop(stream);
        info!("audio capture stopped");
        Ok(())
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| KioskError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Clamp and scale an f32 sample into i16 range.
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_mixdown_averages_channels() {
        let stereo = [0.5, -0.5, 1.0, 0.0];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn sample_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32767);
    }
}
