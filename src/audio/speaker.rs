//! Live monitoring of the bus through the default output device.

use std::sync::mpsc::{self, Sender};
use std::thread;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};

use super::Monitor;

enum Command {
    Feed(Vec<f32>, u32),
    Clear,
}

/// Plays bus audio on the default output device.
///
/// The rodio output stream is not `Send`, so it lives on its own thread and
/// receives chunks over a channel.
pub struct Speaker {
    commands: Sender<Command>,
}

impl Speaker {
    /// Open the default audio output device.
    pub fn open() -> std::io::Result<Self> {
        let (commands, rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("podcast-speaker".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to open audio output: {e}")));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to create audio sink: {e}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                for command in rx {
                    match command {
                        Command::Feed(samples, rate) => {
                            sink.append(SamplesBuffer::new(1, rate, samples));
                        }
                        Command::Clear => {
                            sink.clear();
                            sink.play();
                        }
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { commands }),
            Ok(Err(message)) => Err(std::io::Error::other(message)),
            Err(_) => Err(std::io::Error::other("speaker thread exited")),
        }
    }
}

impl Monitor for Speaker {
    fn feed(&self, samples: &[f32], sample_rate: u32) {
        let _ = self.commands.send(Command::Feed(samples.to_vec(), sample_rate));
    }

    fn clear(&self) {
        let _ = self.commands.send(Command::Clear);
    }
}
