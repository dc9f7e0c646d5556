//! Sequential playback of script turns with session recording.
//!
//! The [`PlaybackController`] owns the session: the turn list, the index of
//! the next turn to speak, and the capture sink. `start` runs the playback
//! loop on the calling task; `pause` and `stop` are meant to be called from
//! other tasks holding the same `Arc<PlaybackController>`.
//!
//! ```text
//! Idle --start--> Playing --pause/error--> Paused --start--> Playing
//!                    |                        |
//!                    +---- end of script -----+--stop--> Idle
//! ```
//!
//! Recording starts together with playback of turn 0 and stops when the last
//! turn has been spoken (the artifact is saved) or on `stop()` (the partial
//! artifact is handed back unsaved).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::audio::{AudioBus, CaptureError, CaptureSink, Recording};
use crate::library::{AudioArtifact, Library, StoreError};
use crate::script::{Speaker, Turn};
use crate::speech::{
    SpeakOptions, SpeakOptionsBuilder, SpeakOutcome, SpeechEngine, SpeechError, VoiceSelector,
};

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: PlaybackState,
    },
    #[error("No turns to play")]
    Empty,
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// Per-host voices and the speaking rate used for every utterance.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub voice_a: VoiceSelector,
    pub voice_b: VoiceSelector,
    pub rate: f32,
    /// Treat an utterance that runs longer than this as failed.
    pub utterance_timeout: Option<Duration>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voice_a: VoiceSelector::Gender(crate::speech::Gender::Male),
            voice_b: VoiceSelector::Gender(crate::speech::Gender::Female),
            rate: 1.0,
            utterance_timeout: None,
        }
    }
}

impl PlaybackConfig {
    fn options(&self, speaker: Speaker) -> SpeakOptions {
        let voice = match speaker {
            Speaker::A => self.voice_a.clone(),
            Speaker::B => self.voice_b.clone(),
        };
        SpeakOptionsBuilder::default()
            .voice(voice)
            .rate(self.rate)
            .build()
            .unwrap_or_default()
    }
}

/// Snapshot of the session, published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub current_index: usize,
    pub total: usize,
    pub is_recording: bool,
    /// The turn being spoken, or about to be.
    pub current_turn: Option<Turn>,
}

impl PlaybackStatus {
    /// Fraction of turns spoken, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.current_index as f32 / self.total as f32
    }
}

/// How a `start()` call ended without an error.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every turn was spoken; the recording was saved under `key`.
    Completed { key: String, artifact: AudioArtifact },
    /// `pause()` halted playback; `at` is the turn that will be spoken next.
    Paused { at: usize },
    /// `stop()` or `load()` ended the session.
    Stopped,
}

struct Session {
    title: String,
    turns: Vec<Turn>,
    current_index: usize,
    state: PlaybackState,
    is_recording: bool,
    /// Bumped by every start, stop and load; a playback loop whose run id
    /// is stale must not touch the session.
    run: u64,
}

/// Drives turns through a speech engine while the session is recorded.
pub struct PlaybackController {
    engine: Arc<dyn SpeechEngine>,
    library: Library,
    config: PlaybackConfig,
    session: Mutex<Session>,
    sink: tokio::sync::Mutex<CaptureSink>,
    /// Held for the duration of each `speak` call.
    voice: tokio::sync::Mutex<()>,
    status: watch::Sender<PlaybackStatus>,
    last_artifact: Mutex<Option<AudioArtifact>>,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        bus: Arc<AudioBus>,
        library: Library,
        config: PlaybackConfig,
    ) -> Self {
        let session = Session {
            title: String::new(),
            turns: Vec::new(),
            current_index: 0,
            state: PlaybackState::Idle,
            is_recording: false,
            run: 0,
        };
        let (status, _) = watch::channel(snapshot(&session));
        Self {
            engine,
            library,
            config,
            session: Mutex::new(session),
            sink: tokio::sync::Mutex::new(CaptureSink::new(bus)),
            voice: tokio::sync::Mutex::new(()),
            status,
            last_artifact: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self) {
        let status = snapshot(&self.session());
        self.status.send_replace(status);
    }

    /// Watch session changes, e.g. to drive a progress bar.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PlaybackStatus {
        snapshot(&self.session())
    }

    /// The most recent artifact of a completed session.
    pub fn last_artifact(&self) -> Option<AudioArtifact> {
        self.last_artifact
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the session with a new script, stopping the current one first.
    ///
    /// A recording in progress is discarded.
    pub async fn load(
        &self,
        title: impl Into<String>,
        turns: Vec<Turn>,
    ) -> Result<(), PlaybackError> {
        let active = self.session().state != PlaybackState::Idle;
        if active {
            self.stop().await?;
        }
        {
            let mut session = self.session();
            session.run += 1;
            session.title = title.into();
            session.turns = turns;
            session.current_index = 0;
            session.state = PlaybackState::Idle;
        }
        self.publish();
        Ok(())
    }

    /// Start or resume playback and run it until the script ends, `pause()`
    /// or `stop()` is called, or an utterance fails.
    ///
    /// On a synthesis error the failed turn is not skipped and the recording
    /// keeps running; calling `start()` again retries that turn.
    pub async fn start(&self) -> Result<RunOutcome, PlaybackError> {
        let (run, previous) = {
            let mut session = self.session();
            if session.state == PlaybackState::Playing {
                return Err(PlaybackError::InvalidTransition {
                    action: "start",
                    state: session.state,
                });
            }
            if session.turns.is_empty() {
                return Err(PlaybackError::Empty);
            }
            let previous = session.state;
            session.state = PlaybackState::Playing;
            session.run += 1;
            (session.run, previous)
        };
        self.publish();

        if let Err(e) = self.engine.initialize().await {
            log::error!("Speech engine failed to initialize: {e}");
            self.restore(run, previous);
            return Err(e.into());
        }

        if let Err(e) = self.begin_recording(run).await {
            self.restore(run, previous);
            return Err(e.into());
        }

        self.run(run).await
    }

    /// Halt playback; the interrupted turn is spoken again on resume.
    pub fn pause(&self) -> Result<(), PlaybackError> {
        {
            let mut session = self.session();
            if session.state != PlaybackState::Playing {
                return Err(PlaybackError::InvalidTransition {
                    action: "pause",
                    state: session.state,
                });
            }
            session.state = PlaybackState::Paused;
        }
        self.engine.cancel();
        self.publish();
        log::debug!("Playback paused");
        Ok(())
    }

    /// End the session and rewind to the first turn.
    ///
    /// Returns the partial recording, which is not saved to the library.
    pub async fn stop(&self) -> Result<Option<AudioArtifact>, PlaybackError> {
        let title = {
            let mut session = self.session();
            if session.state == PlaybackState::Idle {
                return Err(PlaybackError::InvalidTransition {
                    action: "stop",
                    state: session.state,
                });
            }
            session.run += 1;
            session.state = PlaybackState::Idle;
            session.current_index = 0;
            session.title.clone()
        };
        self.engine.cancel();

        let recording = {
            let mut sink = self.sink.lock().await;
            let recording = if sink.is_recording() {
                Some(sink.stop().await)
            } else {
                None
            };
            self.session().is_recording = sink.is_recording();
            recording
        };
        self.publish();
        log::info!("Playback stopped");

        match recording {
            None => Ok(None),
            Some(recording) => Ok(Some(artifact(recording?, title))),
        }
    }

    fn restore(&self, run: u64, previous: PlaybackState) {
        {
            let mut session = self.session();
            if session.run == run && session.state == PlaybackState::Playing {
                session.state = previous;
            }
        }
        self.publish();
    }

    async fn begin_recording(&self, run: u64) -> Result<(), CaptureError> {
        let mut sink = self.sink.lock().await;
        let needed = {
            let session = self.session();
            session.run == run && session.current_index == 0 && !sink.is_recording()
        };
        if needed {
            sink.start()?;
            self.session().is_recording = true;
            self.publish();
        }
        Ok(())
    }

    /// Outcome for a loop whose run was superseded by stop/load/start.
    fn superseded(&self) -> RunOutcome {
        let session = self.session();
        match session.state {
            PlaybackState::Idle => RunOutcome::Stopped,
            _ => RunOutcome::Paused {
                at: session.current_index,
            },
        }
    }

    async fn run(&self, run: u64) -> Result<RunOutcome, PlaybackError> {
        loop {
            let (index, turn) = {
                let session = self.session();
                if session.run != run {
                    drop(session);
                    return Ok(self.superseded());
                }
                if session.state != PlaybackState::Playing {
                    return Ok(RunOutcome::Paused {
                        at: session.current_index,
                    });
                }
                if session.current_index >= session.turns.len() {
                    break;
                }
                (
                    session.current_index,
                    session.turns[session.current_index].clone(),
                )
            };
            self.publish();
            log::debug!("Speaking turn {} ({:?})", index + 1, turn.speaker);

            match self.speak(&turn).await {
                Ok(SpeakOutcome::Finished) => {
                    let mut session = self.session();
                    if session.run != run {
                        drop(session);
                        return Ok(self.superseded());
                    }
                    session.current_index = index + 1;
                }
                Ok(SpeakOutcome::Cancelled) => {
                    let mut session = self.session();
                    if session.run != run {
                        drop(session);
                        return Ok(self.superseded());
                    }
                    if session.state == PlaybackState::Playing {
                        session.state = PlaybackState::Paused;
                    }
                    drop(session);
                    self.publish();
                    return Ok(RunOutcome::Paused { at: index });
                }
                Err(e) => {
                    log::error!("Turn {} failed: {e}", index + 1);
                    {
                        let mut session = self.session();
                        if session.run == run && session.state == PlaybackState::Playing {
                            session.state = PlaybackState::Paused;
                        }
                    }
                    self.publish();
                    return Err(e.into());
                }
            }
            self.publish();
        }

        self.finish(run).await
    }

    async fn speak(&self, turn: &Turn) -> Result<SpeakOutcome, SpeechError> {
        let _voice = self.voice.lock().await;
        let options = self.config.options(turn.speaker);
        let speaking = self.engine.speak(&turn.text, &options);

        match self.config.utterance_timeout {
            None => speaking.await,
            Some(limit) => match tokio::time::timeout(limit, speaking).await {
                Ok(result) => result,
                Err(_) => {
                    self.engine.cancel();
                    Err(SpeechError::Synthesis(format!(
                        "utterance did not finish within {limit:?}"
                    )))
                }
            },
        }
    }

    /// Stop the recording at the end of the script and save it.
    async fn finish(&self, run: u64) -> Result<RunOutcome, PlaybackError> {
        let (recording, title) = {
            let mut sink = self.sink.lock().await;
            if self.session().run != run {
                return Ok(self.superseded());
            }
            let recording = sink.stop().await;

            let mut session = self.session();
            session.is_recording = sink.is_recording();
            session.state = PlaybackState::Idle;
            session.current_index = 0;
            (recording, session.title.clone())
        };
        self.publish();

        let artifact = artifact(recording?, title);
        *self.last_artifact.lock().unwrap_or_else(|e| e.into_inner()) = Some(artifact.clone());
        let key = self.library.save(&artifact).await?;
        log::info!("Podcast complete: {:?} saved as {key}", artifact.title);

        Ok(RunOutcome::Completed { key, artifact })
    }
}

fn snapshot(session: &Session) -> PlaybackStatus {
    PlaybackStatus {
        state: session.state,
        current_index: session.current_index,
        total: session.turns.len(),
        is_recording: session.is_recording,
        current_turn: session.turns.get(session.current_index).cloned(),
    }
}

fn artifact(recording: Recording, title: String) -> AudioArtifact {
    AudioArtifact {
        bytes: recording.bytes,
        mime_type: recording.mime_type,
        title,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ArtifactStore, FileLibrary};
    use crate::script::{segment, Hosts};
    use crate::speech::{Gender, Interrupt, Voice};
    use crate::AudioClip;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RATE: u32 = 1_000;
    const CLIP: usize = 100;

    /// In-memory engine: every utterance is `CLIP` samples routed through the
    /// bus. Individual texts can be set to fail or hang once.
    struct ScriptedEngine {
        bus: Arc<AudioBus>,
        interrupt: Interrupt,
        init_calls: AtomicUsize,
        fail_init: bool,
        spoken: Mutex<Vec<(String, VoiceSelector)>>,
        fail_once: Mutex<HashSet<String>>,
        hang_once: Mutex<HashSet<String>>,
    }

    impl ScriptedEngine {
        fn new(bus: Arc<AudioBus>) -> Self {
            Self {
                bus,
                interrupt: Interrupt::new(),
                init_calls: AtomicUsize::new(0),
                fail_init: false,
                spoken: Mutex::new(Vec::new()),
                fail_once: Mutex::new(HashSet::new()),
                hang_once: Mutex::new(HashSet::new()),
            }
        }

        fn failing_once(self, text: &str) -> Self {
            self.fail_once.lock().unwrap().insert(text.to_string());
            self
        }

        fn hanging_once(self, text: &str) -> Self {
            self.hang_once.lock().unwrap().insert(text.to_string());
            self
        }

        fn spoken_texts(&self) -> Vec<String> {
            self.spoken.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl SpeechEngine for ScriptedEngine {
        async fn initialize(&self) -> Result<(), SpeechError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(SpeechError::EngineUnavailable("no backend".into()));
            }
            Ok(())
        }

        fn voices(&self) -> Vec<Voice> {
            vec![
                Voice {
                    id: "m".into(),
                    display_name: "M".into(),
                    language: "en-us".into(),
                    gender: Some(Gender::Male),
                },
                Voice {
                    id: "f".into(),
                    display_name: "F".into(),
                    language: "en-us".into(),
                    gender: Some(Gender::Female),
                },
            ]
        }

        async fn speak(
            &self,
            text: &str,
            options: &SpeakOptions,
        ) -> Result<SpeakOutcome, SpeechError> {
            let armed = self.interrupt.arm();
            self.spoken
                .lock()
                .unwrap()
                .push((text.to_string(), options.voice.clone()));

            if self.fail_once.lock().unwrap().remove(text) {
                return Err(SpeechError::Synthesis(format!("cannot say {text:?}")));
            }
            if self.hang_once.lock().unwrap().remove(text) {
                self.interrupt.triggered(armed).await;
                return Ok(SpeakOutcome::Cancelled);
            }
            Ok(self
                .bus
                .play(AudioClip::new(vec![0.2; CLIP], RATE), &self.interrupt, armed)
                .await)
        }

        fn cancel(&self) {
            self.interrupt.trigger();
        }

        fn name(&self) -> String {
            "scripted".into()
        }
    }

    struct Fixture {
        controller: Arc<PlaybackController>,
        engine: Arc<ScriptedEngine>,
        bus: Arc<AudioBus>,
        library: Library,
        _dir: tempfile::TempDir,
    }

    fn fixture(
        build: impl FnOnce(ScriptedEngine) -> ScriptedEngine,
        config: PlaybackConfig,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(AudioBus::new(RATE).unpaced());
        let engine = Arc::new(build(ScriptedEngine::new(bus.clone())));
        let store: Arc<dyn ArtifactStore> = Arc::new(FileLibrary::new(dir.path()));
        let library = Library::new(store);
        let controller = Arc::new(PlaybackController::new(
            engine.clone(),
            bus.clone(),
            library.clone(),
            config,
        ));
        Fixture {
            controller,
            engine,
            bus,
            library,
            _dir: dir,
        }
    }

    fn scenario() -> Vec<Turn> {
        segment(
            "Alex: Hello there.\nJamie: Hi Alex!\nAlex: How are you?",
            &Hosts::default(),
        )
    }

    fn samples(artifact: &AudioArtifact) -> usize {
        AudioClip::from_wav_bytes(&artifact.bytes).unwrap().samples.len()
    }

    async fn wait_for_spoken(engine: &ScriptedEngine, count: usize) {
        for _ in 0..200 {
            if engine.spoken_texts().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never reached {count} utterances");
    }

    #[tokio::test]
    async fn full_playback_produces_one_artifact() {
        let fx = fixture(|e| e, PlaybackConfig::default());
        fx.controller.load("Episode", scenario()).await.unwrap();

        let mut status = fx.controller.subscribe();
        let outcome = fx.controller.start().await.unwrap();

        let RunOutcome::Completed { key, artifact } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(artifact.title, "Episode");
        assert_eq!(samples(&artifact), 3 * CLIP);

        let entries = fx.library.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, key);
        assert_eq!(fx.controller.last_artifact(), Some(artifact));

        let final_status = status.borrow_and_update().clone();
        assert_eq!(final_status.state, PlaybackState::Idle);
        assert_eq!(final_status.current_index, 0);
        assert!(!final_status.is_recording);
        assert!(!fx.bus.is_tapped());

        let voices: Vec<VoiceSelector> = fx
            .engine
            .spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(
            voices,
            vec![
                VoiceSelector::Gender(Gender::Male),
                VoiceSelector::Gender(Gender::Female),
                VoiceSelector::Gender(Gender::Male),
            ]
        );
    }

    #[tokio::test]
    async fn synthesis_error_keeps_index_and_recording() {
        let fx = fixture(|e| e.failing_once("Hi Alex!"), PlaybackConfig::default());
        fx.controller.load("Episode", scenario()).await.unwrap();

        let err = fx.controller.start().await.unwrap_err();
        assert!(matches!(err, PlaybackError::Speech(SpeechError::Synthesis(_))));

        let status = fx.controller.status();
        assert_eq!(status.current_index, 1);
        assert_eq!(status.state, PlaybackState::Paused);
        assert!(status.is_recording);
        assert!(fx.bus.is_tapped());

        // Retrying resumes at the failed turn and finishes the same recording.
        let outcome = fx.controller.start().await.unwrap();
        let RunOutcome::Completed { artifact, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(samples(&artifact), 3 * CLIP);
        assert_eq!(
            fx.engine.spoken_texts(),
            vec!["Hello there.", "Hi Alex!", "Hi Alex!", "How are you?"]
        );
        assert_eq!(fx.library.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pause_then_resume_respeaks_interrupted_turn() {
        let fx = fixture(|e| e.hanging_once("Hello there."), PlaybackConfig::default());
        fx.controller.load("Episode", scenario()).await.unwrap();

        let task = {
            let controller = fx.controller.clone();
            tokio::spawn(async move { controller.start().await })
        };
        wait_for_spoken(&fx.engine, 1).await;
        fx.controller.pause().unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, RunOutcome::Paused { at: 0 }));
        assert_eq!(fx.controller.status().current_index, 0);
        assert_eq!(fx.controller.status().state, PlaybackState::Paused);

        let outcome = fx.controller.start().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(
            fx.engine.spoken_texts(),
            vec!["Hello there.", "Hello there.", "Hi Alex!", "How are you?"]
        );
    }

    #[tokio::test]
    async fn stop_returns_unsaved_partial_recording() {
        let fx = fixture(|e| e.hanging_once("Hi Alex!"), PlaybackConfig::default());
        fx.controller.load("Episode", scenario()).await.unwrap();

        let task = {
            let controller = fx.controller.clone();
            tokio::spawn(async move { controller.start().await })
        };
        wait_for_spoken(&fx.engine, 2).await;

        let partial = fx.controller.stop().await.unwrap().expect("partial recording");
        assert_eq!(samples(&partial), CLIP);
        assert!(matches!(task.await.unwrap().unwrap(), RunOutcome::Stopped));

        let status = fx.controller.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.current_index, 0);
        assert!(!status.is_recording);
        assert!(!fx.bus.is_tapped());
        assert!(fx.library.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_unavailable_leaves_session_idle() {
        let fx = fixture(
            |mut e| {
                e.fail_init = true;
                e
            },
            PlaybackConfig::default(),
        );
        fx.controller.load("Episode", scenario()).await.unwrap();

        let err = fx.controller.start().await.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Speech(SpeechError::EngineUnavailable(_))
        ));
        let status = fx.controller.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(!status.is_recording);
        assert!(!fx.bus.is_tapped());
    }

    #[tokio::test]
    async fn rejects_invalid_transitions() {
        let fx = fixture(|e| e, PlaybackConfig::default());
        assert!(matches!(fx.controller.start().await, Err(PlaybackError::Empty)));
        assert!(matches!(
            fx.controller.pause(),
            Err(PlaybackError::InvalidTransition { action: "pause", .. })
        ));
        assert!(matches!(
            fx.controller.stop().await,
            Err(PlaybackError::InvalidTransition { action: "stop", .. })
        ));
    }

    #[tokio::test]
    async fn watchdog_fails_hung_utterance() {
        let config = PlaybackConfig {
            utterance_timeout: Some(Duration::from_millis(50)),
            ..PlaybackConfig::default()
        };
        let fx = fixture(|e| e.hanging_once("Hi Alex!"), config);
        fx.controller.load("Episode", scenario()).await.unwrap();

        let err = fx.controller.start().await.unwrap_err();
        assert!(matches!(err, PlaybackError::Speech(SpeechError::Synthesis(_))));
        assert_eq!(fx.controller.status().current_index, 1);

        let outcome = fx.controller.start().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn loading_a_new_script_discards_the_active_session() {
        let fx = fixture(|e| e.failing_once("How are you?"), PlaybackConfig::default());
        fx.controller.load("First", scenario()).await.unwrap();
        assert!(fx.controller.start().await.is_err());
        assert!(fx.bus.is_tapped());

        fx.controller
            .load("Second", vec![Turn::new(Speaker::B, "Only one.")])
            .await
            .unwrap();
        let status = fx.controller.status();
        assert_eq!(status.total, 1);
        assert_eq!(status.state, PlaybackState::Idle);
        assert!(!fx.bus.is_tapped());

        let RunOutcome::Completed { artifact, .. } = fx.controller.start().await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(artifact.title, "Second");
        assert_eq!(samples(&artifact), CLIP);
        assert_eq!(fx.engine.init_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn progress_is_fraction_of_turns() {
        let status = PlaybackStatus {
            state: PlaybackState::Playing,
            current_index: 1,
            total: 4,
            is_recording: true,
            current_turn: None,
        };
        assert_eq!(status.progress(), 0.25);
    }
}
