//! The local podcast library: saving, listing, loading, deleting and
//! exporting recorded podcasts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::audio::AudioBus;
use crate::speech::{Interrupt, SpeakOutcome};
use crate::AudioClip;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt library entry {key}: {message}")]
    Corrupt { key: String, message: String },
    #[error("No podcast stored under {0}")]
    NotFound(String),
    #[error("Relay unavailable: {0}")]
    Relay(String),
    #[error("Invalid library key: {0:?}")]
    InvalidKey(String),
    #[error("Stored audio cannot be decoded: {0}")]
    Decode(#[from] hound::Error),
}

/// Encoded audio of one playback session.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl AudioArtifact {
    /// File extension for the artifact's MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/webm" => "webm",
        _ => "bin",
    }
}

/// Listing record for a stored podcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastEntry {
    pub key: String,
    pub title: String,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
    pub mime_type: String,
}

/// Library key for an artifact created at `created_at`, e.g.
/// `podcast_2026-10-18T09-30-00-123Z`.
pub fn artifact_key(created_at: &DateTime<Utc>) -> String {
    let stamp = created_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("podcast_{stamp}")
}

/// Keys look like `podcast_` followed by ASCII letters, digits and `-`.
fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = key.strip_prefix("podcast_").is_some_and(|stamp| {
        !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Lowercase `title` and replace everything but ASCII letters and digits
/// with underscores.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Write the artifact into `dir` as `<sanitized_title>_<unix_millis>.<ext>`
/// and return the path.
pub async fn export(artifact: &AudioArtifact, dir: &Path) -> Result<PathBuf, StoreError> {
    let title = if artifact.title.trim().is_empty() {
        "podcast"
    } else {
        artifact.title.as_str()
    };
    let filename = format!(
        "{}_{}.{}",
        sanitize_title(title),
        Utc::now().timestamp_millis(),
        artifact.extension()
    );
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, &artifact.bytes).await?;
    log::info!("Exported podcast to {}", path.display());
    Ok(path)
}

/// Play a stored artifact through `bus` until it ends or `interrupt` fires.
pub async fn play(
    artifact: &AudioArtifact,
    bus: &AudioBus,
    interrupt: &Interrupt,
) -> Result<SpeakOutcome, StoreError> {
    let armed = interrupt.arm();
    let clip = AudioClip::from_wav_bytes(&artifact.bytes)?;
    log::info!(
        "Playing {:?} ({:.1}s)",
        artifact.title,
        clip.duration_secs()
    );
    Ok(bus.play(clip, interrupt, armed).await)
}

/// Keyed storage for recorded podcasts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, key: &str, artifact: &AudioArtifact) -> Result<(), StoreError>;

    /// All stored podcasts, newest first.
    async fn list(&self) -> Result<Vec<PodcastEntry>, StoreError>;

    async fn load(&self, key: &str) -> Result<AudioArtifact, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Stores each podcast as `<key>.json` metadata next to `<key>.<ext>` audio.
pub struct FileLibrary {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    title: String,
    date: DateTime<Utc>,
    mime_type: String,
    audio: String,
}

impl FileLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_entry(&self, key: &str) -> Result<StoredEntry, StoreError> {
        check_key(key)?;
        let raw = match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let entry: StoredEntry = serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        // The audio file must sit next to its metadata.
        if Path::new(&entry.audio).file_name() != Some(std::ffi::OsStr::new(&entry.audio)) {
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                message: format!("audio path {:?} leaves the library", entry.audio),
            });
        }
        Ok(entry)
    }
}

#[async_trait]
impl ArtifactStore for FileLibrary {
    async fn save(&self, key: &str, artifact: &AudioArtifact) -> Result<(), StoreError> {
        check_key(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let audio = format!("{key}.{}", artifact.extension());
        tokio::fs::write(self.dir.join(&audio), &artifact.bytes).await?;

        let entry = StoredEntry {
            title: artifact.title.clone(),
            date: artifact.created_at,
            mime_type: artifact.mime_type.clone(),
            audio,
        };
        let json = serde_json::to_vec_pretty(&entry).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        // Metadata last: an entry is listed only once its audio is on disk.
        tokio::fs::write(self.meta_path(key), json).await?;
        log::info!("Podcast saved to {} as {key}", self.dir.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PodcastEntry>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(file) = dir.next_entry().await? {
            let name = file.file_name().to_string_lossy().into_owned();
            let Some(key) = name.strip_suffix(".json") else {
                continue;
            };
            if !key.starts_with("podcast_") {
                continue;
            }
            match self.read_entry(key).await {
                Ok(stored) => entries.push(PodcastEntry {
                    key: key.to_string(),
                    title: stored.title,
                    created_at: stored.date,
                    mime_type: stored.mime_type,
                }),
                Err(e) => log::warn!("Skipping library entry {key}: {e}"),
            }
        }

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn load(&self, key: &str) -> Result<AudioArtifact, StoreError> {
        let stored = self.read_entry(key).await?;
        let bytes = tokio::fs::read(self.dir.join(&stored.audio)).await?;
        Ok(AudioArtifact {
            bytes,
            mime_type: stored.mime_type,
            title: stored.title,
            created_at: stored.date,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let stored = self.read_entry(key).await?;
        tokio::fs::remove_file(self.meta_path(key)).await?;
        match tokio::fs::remove_file(self.dir.join(&stored.audio)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        log::info!("Deleted podcast {key}");
        Ok(())
    }
}

/// A save request relayed to an out-of-process persistence handler.
pub struct SaveRequest {
    pub key: String,
    pub artifact: AudioArtifact,
    pub reply: oneshot::Sender<Result<(), StoreError>>,
}

/// Sending half of the save relay.
#[derive(Clone)]
pub struct Relay {
    tx: mpsc::Sender<SaveRequest>,
}

impl Relay {
    pub fn new(tx: mpsc::Sender<SaveRequest>) -> Self {
        Self { tx }
    }

    /// Spawn a handler task that saves relayed requests into `store`.
    pub fn spawn(store: Arc<dyn ArtifactStore>) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SaveRequest>(8);
        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = store.save(&request.key, &request.artifact).await;
                let _ = request.reply.send(result);
            }
        });
        (Self::new(tx), handle)
    }

    async fn save(&self, key: &str, artifact: &AudioArtifact) -> Result<(), StoreError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SaveRequest {
                key: key.to_string(),
                artifact: artifact.clone(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Relay("handler is gone".to_string()))?;
        response
            .await
            .map_err(|_| StoreError::Relay("handler dropped the request".to_string()))?
    }
}

/// Persistence used by the playback controller: a primary store plus an
/// optional relay tried when the primary write fails.
#[derive(Clone)]
pub struct Library {
    store: Arc<dyn ArtifactStore>,
    relay: Option<Relay>,
}

impl Library {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store, relay: None }
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Save `artifact` under a key derived from its creation time.
    pub async fn save(&self, artifact: &AudioArtifact) -> Result<String, StoreError> {
        let key = artifact_key(&artifact.created_at);
        match self.store.save(&key, artifact).await {
            Ok(()) => Ok(key),
            Err(e) => match &self.relay {
                Some(relay) => {
                    log::warn!("Failed to save podcast directly ({e}), relaying");
                    relay.save(&key, artifact).await?;
                    log::info!("Podcast saved via relay as {key}");
                    Ok(key)
                }
                None => Err(e),
            },
        }
    }

    pub async fn list(&self) -> Result<Vec<PodcastEntry>, StoreError> {
        self.store.list().await
    }

    pub async fn load(&self, key: &str) -> Result<AudioArtifact, StoreError> {
        self.store.load(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key).await
    }
}
