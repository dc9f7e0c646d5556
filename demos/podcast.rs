//! Command-line front end: create podcasts and manage the local library.
//!
//! ```text
//! cargo run --example podcast -- create --script script.txt --title "Rust talk"
//! cargo run --example podcast --features gemini -- create --content thread.json
//! cargo run --example podcast -- list
//! cargo run --example podcast --features speaker -- play podcast_2026-02-03T10-00-00-000Z
//! cargo run --example podcast -- export podcast_2026-02-03T10-00-00-000Z --dir out
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use podcast_tts::{
    audio::AudioBus,
    generate::{Content, FixedScript, ScriptGenerator},
    library::{export, FileLibrary, Library},
    playback::{PlaybackController, PlaybackState, RunOutcome},
    segment,
    speech::create_engine,
    AudioArtifact, Settings,
};

/// Two-host podcasts from discussion threads
#[derive(Parser, Debug)]
#[command(name = "podcast", version, about = "Two-host podcasts from discussion threads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the settings file
    #[arg(long, global = true, value_name = "PATH", default_value = "settings.json")]
    settings: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Speak a script and save the recording to the library
    Create {
        /// Read a ready-made script ("Alex: ..." lines)
        #[arg(long, value_name = "PATH", conflicts_with = "content")]
        script: Option<PathBuf>,

        /// Generate the script from a thread (JSON: title, body_text, comments)
        #[arg(long, value_name = "PATH")]
        content: Option<PathBuf>,

        /// Title stored with the podcast
        #[arg(long)]
        title: Option<String>,
    },

    /// List voices offered by the configured backend
    Voices,

    /// List saved podcasts, newest first
    List,

    /// Play a saved podcast on the default output device
    Play { key: String },

    /// Delete a saved podcast
    Delete { key: String },

    /// Copy a saved podcast out of the library
    Export {
        key: String,

        #[arg(long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.settings)
        .with_context(|| format!("loading {}", cli.settings.display()))?;
    let library = Library::new(Arc::new(FileLibrary::new(&settings.library_dir)));

    match cli.command {
        Commands::Create {
            script,
            content,
            title,
        } => create(&settings, library, script, content, title).await,
        Commands::Voices => {
            let bus = Arc::new(AudioBus::new(settings.sample_rate));
            let engine = create_engine(&settings.backend, bus)?;
            engine.initialize().await?;
            for voice in engine.voices() {
                println!(
                    "{:<24} {:<32} {:<8} {:?}",
                    voice.id, voice.display_name, voice.language, voice.gender
                );
            }
            Ok(())
        }
        Commands::List => {
            for entry in library.list().await? {
                println!(
                    "{}  {}  {}",
                    entry.key,
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.title
                );
            }
            Ok(())
        }
        Commands::Play { key } => {
            let artifact = library.load(&key).await?;
            play_stored(&artifact, settings.sample_rate).await
        }
        Commands::Delete { key } => {
            library.delete(&key).await?;
            println!("Deleted {key}");
            Ok(())
        }
        Commands::Export { key, dir } => {
            let artifact = library.load(&key).await?;
            let path = export(&artifact, &dir).await?;
            println!("Exported to {}", path.display());
            Ok(())
        }
    }
}

async fn create(
    settings: &Settings,
    library: Library,
    script: Option<PathBuf>,
    content: Option<PathBuf>,
    title: Option<String>,
) -> Result<()> {
    let (text, default_title) = match (script, content) {
        (Some(path), _) => {
            let text = tokio::fs::read_to_string(&path).await?;
            let generator = FixedScript(text);
            (
                generator.generate(&Content::default(), &settings.hosts).await?,
                "Podcast".to_string(),
            )
        }
        (None, Some(path)) => {
            let raw = tokio::fs::read_to_string(&path).await?;
            let thread: Content = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            let thread = thread.trimmed(settings.comment_count, settings.skip_usernames);
            let generator = generator(settings)?;
            let text = generator.generate(&thread, &settings.hosts).await?;
            (text, thread.title)
        }
        (None, None) => bail!("pass --script or --content"),
    };

    let turns = segment(&text, &settings.hosts);
    println!("{} turns", turns.len());

    let bus = AudioBus::new(settings.sample_rate);
    let bus = if settings.realtime { bus } else { bus.unpaced() };
    #[cfg(feature = "speaker")]
    let bus = match podcast_tts::audio::speaker::Speaker::open() {
        Ok(speaker) => bus.with_monitor(Box::new(speaker)),
        Err(e) => {
            log::warn!("No audio output, recording silently: {e}");
            bus
        }
    };
    let bus = Arc::new(bus);

    let engine = create_engine(&settings.backend, bus.clone())?;
    let controller = Arc::new(PlaybackController::new(
        engine,
        bus,
        library.clone(),
        settings.playback(),
    ));
    controller
        .load(title.unwrap_or(default_title), turns)
        .await?;

    let mut status = controller.subscribe();
    let hosts = settings.hosts.clone();
    let progress = tokio::spawn(async move {
        let mut last = None;
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if last == Some(current.current_index) {
                continue;
            }
            last = Some(current.current_index);
            if let Some(turn) = &current.current_turn {
                println!(
                    "[{:>3.0}%] {}: {}",
                    current.progress() * 100.0,
                    hosts.name(turn.speaker),
                    turn.text
                );
            }
        }
    });

    let stopper = {
        let controller = controller.clone();
        let library = library.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                save_partial(&controller, &library).await;
            }
        })
    };

    let outcome = controller.start().await;
    progress.abort();
    if matches!(outcome, Ok(RunOutcome::Stopped)) {
        // Ctrl-C ended the session; let the partial recording finish saving.
        let _ = stopper.await;
    } else {
        stopper.abort();
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Playback failed: {e}");
            save_partial(&controller, &library).await;
            return Err(e.into());
        }
    };

    match outcome {
        RunOutcome::Completed { key, artifact } => {
            println!("Saved {:?} as {key}", artifact.title);
        }
        RunOutcome::Paused { at } => println!("Paused before turn {}", at + 1),
        RunOutcome::Stopped => println!("Stopped"),
    }
    Ok(())
}

/// Stop the session and keep whatever was recorded so far.
async fn save_partial(controller: &PlaybackController, library: &Library) {
    if controller.status().state == PlaybackState::Idle {
        return;
    }
    match controller.stop().await {
        Ok(Some(partial)) => match library.save(&partial).await {
            Ok(key) => println!("Stopped; partial recording saved as {key}"),
            Err(e) => log::warn!("Failed to save partial recording: {e}"),
        },
        Ok(None) => {}
        Err(e) => log::warn!("Stop failed: {e}"),
    }
}

#[cfg(feature = "speaker")]
async fn play_stored(artifact: &AudioArtifact, sample_rate: u32) -> Result<()> {
    use podcast_tts::{audio::speaker::Speaker, speech::Interrupt};

    let bus = AudioBus::new(sample_rate).with_monitor(Box::new(Speaker::open()?));
    let interrupt = Interrupt::new();
    println!("Playing {:?}, Ctrl-C to stop", artifact.title);

    tokio::select! {
        outcome = podcast_tts::library::play(artifact, &bus, &interrupt) => {
            outcome?;
            // Let the output device drain its last chunk.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        _ = tokio::signal::ctrl_c() => interrupt.trigger(),
    }
    Ok(())
}

#[cfg(not(feature = "speaker"))]
async fn play_stored(_artifact: &AudioArtifact, _sample_rate: u32) -> Result<()> {
    bail!("playing podcasts needs the `speaker` feature")
}

#[cfg(feature = "gemini")]
fn generator(settings: &Settings) -> Result<Box<dyn ScriptGenerator>> {
    let key = settings
        .gemini_api_key
        .clone()
        .context("set GEMINI_API_KEY or gemini_api_key in settings")?;
    Ok(Box::new(podcast_tts::generate::Gemini::new(key)?))
}

#[cfg(not(feature = "gemini"))]
fn generator(_settings: &Settings) -> Result<Box<dyn ScriptGenerator>> {
    bail!("script generation needs the `gemini` feature")
}
