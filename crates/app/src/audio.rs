//! Sound effect playback on a dedicated audio thread.

use chat_host::TransientMedia;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::mpsc::{self, Sender};
use std::thread;

struct AudioJob {
    media: TransientMedia,
    volume: f32,
}

/// Handle to the audio thread. Cloning shares the same thread.
#[derive(Clone)]
pub struct AudioPlayer {
    tx: Sender<AudioJob>,
}

impl AudioPlayer {
    /// Spawn the audio thread. Without an output device every job is dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<AudioJob>();
        let spawned = thread::Builder::new()
            .name("audio".into())
            .spawn(move || {
                // The stream must stay alive (and on this thread) while sounds play.
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("No audio output available: {}", e);
                        for job in rx {
                            drop(job.media);
                        }
                        return;
                    }
                };

                for job in rx {
                    let sink = match Sink::try_new(&handle) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!("Could not open audio sink: {}", e);
                            continue;
                        }
                    };
                    let decoder = match Decoder::new(Cursor::new(job.media.shared_data())) {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!("Could not decode {}: {}", job.media.name(), e);
                            continue;
                        }
                    };
                    sink.set_volume(job.volume.clamp(0.0, 1.0));
                    sink.append(decoder);
                    tracing::debug!("Playing {}", job.media.name());

                    // Hold the media until playback ends, then release it
                    let media = job.media;
                    thread::spawn(move || {
                        sink.sleep_until_end();
                        drop(media);
                    });
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Could not start audio thread: {}", e);
        }
        Self { tx }
    }

    pub fn play(&self, media: TransientMedia, volume: f32) {
        // A dead audio thread hands the job back; dropping it releases the media.
        if let Err(mpsc::SendError(job)) = self.tx.send(AudioJob { media, volume }) {
            tracing::debug!("Audio thread gone, dropping {}", job.media.name());
        }
    }
}
