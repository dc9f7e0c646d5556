use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use podcast_tts::{
    audio::{AudioBus, CaptureSink},
    speech::kokoro::{KokoroModel, KokoroSpeech},
    SpeakOptions, SpeechEngine, VoiceSelector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let model_path = PathBuf::from("models/kokoro");
    let text = "Hello! This is Kokoro, a text to speech model with multilingual support. \
                Today we are recording a short podcast intro.";

    // Direct model access: synthesize one clip and time it.
    let load_start = Instant::now();
    let mut model = KokoroModel::load(&model_path, None)?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let synth_start = Instant::now();
    let clip = model.synthesize(text, "af_heart", 1.0)?;
    let synth_dur = synth_start.elapsed();
    let speedup = clip.duration_secs() / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        clip.duration_secs(),
        synth_dur,
        speedup
    );
    clip.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");
    drop(model);

    // The same text as a speech engine, recorded off the bus.
    let bus = Arc::new(AudioBus::new(24_000).unpaced());
    let engine = KokoroSpeech::new(model_path, bus.clone());
    engine.initialize().await?;
    println!(
        "Available voices: {:?}",
        engine.voices().iter().map(|v| v.id.as_str()).collect::<Vec<_>>()
    );

    let mut sink = CaptureSink::new(bus);
    sink.start()?;
    let options = SpeakOptions {
        voice: VoiceSelector::Id("bm_george".to_string()),
        rate: 1.1,
    };
    engine.speak(text, &options).await?;
    let recording = sink.stop().await?;
    std::fs::write("recorded.wav", &recording.bytes)?;
    println!(
        "Recorded {:.2}s through the bus to recorded.wav",
        recording.duration_secs
    );

    Ok(())
}
