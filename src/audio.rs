//! Audio playback for session transition chimes.

use crate::engine::CompletionEvent;
use rodio::source::{SineWave, Source, Zero};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to initialize audio output: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("Failed to play audio: {0}")]
    Play(#[from] rodio::PlayError),
}

/// Tone sequence (frequency in Hz, length in ms) played for `event`.
pub fn chime_for(event: CompletionEvent) -> &'static [(f32, u64)] {
    match event {
        // rising: time to rest
        CompletionEvent::FocusComplete {
            is_long_break: false,
            ..
        } => &[(880.0, 150), (1046.5, 200)],
        CompletionEvent::FocusComplete {
            is_long_break: true,
            ..
        } => &[(880.0, 150), (1046.5, 150), (1318.5, 250)],
        // falling: back to work
        CompletionEvent::ShortBreakComplete => &[(1046.5, 150), (880.0, 200)],
        CompletionEvent::LongBreakComplete => &[(1318.5, 150), (1046.5, 150), (880.0, 250)],
    }
}

pub struct AudioPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioPlayer {
    /// Creates a new audio player.
    pub fn new() -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Plays the chime for a completed session.
    pub fn play_chime(&self, event: CompletionEvent) {
        if let Err(e) = self.play_tones(chime_for(event)) {
            warn!(error = %e, "failed to play chime");
        }
    }

    fn play_tones(&self, tones: &[(f32, u64)]) -> Result<(), AudioError> {
        let sink = Sink::try_new(&self.handle)?;

        for (i, &(freq, millis)) in tones.iter().enumerate() {
            if i > 0 {
                sink.append(Zero::<f32>::new(1, 44100).take_duration(Duration::from_millis(50)));
            }
            sink.append(
                SineWave::new(freq)
                    .take_duration(Duration::from_millis(millis))
                    .amplify(0.3),
            );
        }
        sink.detach(); // Play in background

        Ok(())
    }
}
