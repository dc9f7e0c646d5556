//! The shared audio destination.
//!
//! Speech engines play every utterance through an [`AudioBus`]. A recording
//! attaches to the bus as a tap and receives everything that is played while
//! it is attached; an optional monitor (the speakers) hears the same stream.

pub mod capture;
#[cfg(feature = "speaker")]
pub mod speaker;

pub use capture::{CaptureError, CaptureSink, Recording};

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::speech::{Interrupt, SpeakOutcome};
use crate::AudioClip;

/// Length of one chunk routed through the bus.
pub const CHUNK_MS: u64 = 100;

/// Something that listens to the bus live, e.g. the default output device.
pub trait Monitor: Send + Sync {
    fn feed(&self, samples: &[f32], sample_rate: u32);

    /// Drop whatever is queued but not yet heard.
    fn clear(&self);
}

/// Shared destination for synthesized speech.
pub struct AudioBus {
    sample_rate: u32,
    realtime: bool,
    tap: Mutex<Option<UnboundedSender<Vec<f32>>>>,
    monitor: Option<Box<dyn Monitor>>,
}

impl AudioBus {
    /// A bus that plays utterances at real-time pace.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            realtime: true,
            tap: Mutex::new(None),
            monitor: None,
        }
    }

    /// Route utterances as fast as they are synthesized instead of pacing
    /// them to their duration.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn with_monitor(mut self, monitor: Box<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Attach a recording tap. Returns `false` if another tap is attached.
    pub(crate) fn attach(&self, tap: UnboundedSender<Vec<f32>>) -> bool {
        let mut slot = self.tap.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|t| !t.is_closed()) {
            return false;
        }
        *slot = Some(tap);
        true
    }

    /// Detach the recording tap, closing its channel.
    pub(crate) fn detach(&self) {
        let mut slot = self.tap.lock().unwrap_or_else(|e| e.into_inner());
        slot.take();
    }

    pub fn is_tapped(&self) -> bool {
        let slot = self.tap.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(|t| !t.is_closed())
    }

    fn route(&self, chunk: &[f32]) {
        if let Some(monitor) = &self.monitor {
            monitor.feed(chunk, self.sample_rate);
        }
        let slot = self.tap.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tap) = slot.as_ref() {
            // A closed receiver means the recording was dropped mid-session.
            let _ = tap.send(chunk.to_vec());
        }
    }

    /// Play a clip through the bus in chunks, stopping early when
    /// `interrupt` fires after `armed` was taken.
    pub async fn play(&self, clip: AudioClip, interrupt: &Interrupt, armed: u64) -> SpeakOutcome {
        let clip = clip.resampled(self.sample_rate);
        let chunk_len = (self.sample_rate as u64 * CHUNK_MS / 1000).max(1) as usize;

        for chunk in clip.samples.chunks(chunk_len) {
            if interrupt.is_triggered(armed) {
                return self.interrupted();
            }
            self.route(chunk);

            if self.realtime {
                let pace = Duration::from_secs_f64(chunk.len() as f64 / self.sample_rate as f64);
                tokio::select! {
                    _ = tokio::time::sleep(pace) => {}
                    _ = interrupt.triggered(armed) => return self.interrupted(),
                }
            }
        }

        if interrupt.is_triggered(armed) {
            return self.interrupted();
        }
        SpeakOutcome::Finished
    }

    fn interrupted(&self) -> SpeakOutcome {
        if let Some(monitor) = &self.monitor {
            monitor.clear();
        }
        SpeakOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn unpaced_play_routes_all_chunks_to_tap() {
        let bus = AudioBus::new(1_000).unpaced();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(bus.attach(tx));

        let interrupt = Interrupt::new();
        let clip = AudioClip::new(vec![0.25; 250], 1_000);
        let outcome = bus.play(clip, &interrupt, interrupt.arm()).await;
        assert_eq!(outcome, SpeakOutcome::Finished);

        bus.detach();
        let mut total = 0;
        let mut chunks = 0;
        while let Some(chunk) = rx.recv().await {
            total += chunk.len();
            chunks += 1;
        }
        assert_eq!(total, 250);
        assert_eq!(chunks, 3);
    }

    #[test]
    fn second_tap_is_rejected_until_detached() {
        let bus = AudioBus::new(1_000);
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        assert!(bus.attach(tx1));
        assert!(!bus.attach(tx2.clone()));
        bus.detach();
        assert!(bus.attach(tx2));
    }

    #[tokio::test]
    async fn realtime_play_stops_on_interrupt() {
        let bus = Arc::new(AudioBus::new(1_000));
        let interrupt = Arc::new(Interrupt::new());
        let armed = interrupt.arm();

        let task = {
            let (bus, interrupt) = (bus.clone(), interrupt.clone());
            // Ten seconds of audio
            tokio::spawn(async move {
                bus.play(AudioClip::new(vec![0.0; 10_000], 1_000), &interrupt, armed)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        interrupt.trigger();

        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("play should stop promptly")
            .unwrap();
        assert_eq!(outcome, SpeakOutcome::Cancelled);
    }
}
