//! Recording everything played through the bus.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::AudioBus;
use crate::AudioClip;

pub const WAV_MIME: &str = "audio/wav";

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Recording already in progress")]
    AlreadyRecording,
    #[error("Audio bus already has a recording attached")]
    BusBusy,
    #[error("stop() called without a matching start()")]
    NotRecording,
    #[error("Failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// Encoded audio of one recording session.
#[derive(Debug, Clone)]
pub struct Recording {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f64,
}

/// Accumulates the audio routed through an [`AudioBus`] between `start` and
/// `stop`.
pub struct CaptureSink {
    bus: Arc<AudioBus>,
    receiver: Option<UnboundedReceiver<Vec<f32>>>,
}

impl CaptureSink {
    pub fn new(bus: Arc<AudioBus>) -> Self {
        Self {
            bus,
            receiver: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.receiver.is_some()
    }

    /// Attach to the bus and start accumulating into an empty buffer.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.receiver.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.bus.attach(tx) {
            return Err(CaptureError::BusBusy);
        }
        self.receiver = Some(rx);
        log::info!("Started recording podcast audio");
        Ok(())
    }

    /// Detach from the bus and encode everything captured so far.
    pub async fn stop(&mut self) -> Result<Recording, CaptureError> {
        let mut rx = self.receiver.take().ok_or(CaptureError::NotRecording)?;
        self.bus.detach();

        let mut samples = Vec::new();
        while let Some(chunk) = rx.recv().await {
            samples.extend_from_slice(&chunk);
        }

        let clip = AudioClip::new(samples, self.bus.sample_rate());
        let duration_secs = clip.duration_secs();
        let bytes = clip.to_wav_bytes()?;
        log::info!(
            "Stopped recording: {:.1}s of audio, {} bytes",
            duration_secs,
            bytes.len()
        );

        Ok(Recording {
            bytes,
            mime_type: WAV_MIME.to_string(),
            duration_secs,
        })
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.bus.detach();
        }
    }
}
