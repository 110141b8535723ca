//! Playback of the voice clips the server attaches to its replies.
//!
//! The wire format is a base64-encoded MP3. Decoding and playback failures
//! are reported to the caller, who logs them; a reply whose audio cannot be
//! played is still a perfectly good reply.

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

/// Decodes the `audio` field of a chat reply into raw MP3 bytes.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(payload.trim())
        .context("invalid base64 audio payload")
}

/// Holds the default output device open for the life of the session.
pub struct AudioPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioPlayer {
    /// Returns `None` when the host has no usable audio output.
    pub fn new() -> Option<Self> {
        match OutputStream::try_default() {
            Ok((stream, handle)) => Some(Self {
                _stream: stream,
                handle,
            }),
            Err(e) => {
                tracing::debug!("no audio output device: {e}");
                None
            }
        }
    }

    /// Starts playback and returns immediately; the clip finishes on its own.
    pub fn play(&self, bytes: Vec<u8>, volume: f32) -> Result<()> {
        let sink = self.start(bytes, volume)?;
        sink.detach();
        Ok(())
    }

    /// Plays a clip to completion. Used by the one-shot CLI, where the
    /// process would otherwise exit mid-clip.
    pub fn play_to_end(&self, bytes: Vec<u8>, volume: f32) -> Result<()> {
        let sink = self.start(bytes, volume)?;
        sink.sleep_until_end();
        Ok(())
    }

    fn start(&self, bytes: Vec<u8>, volume: f32) -> Result<Sink> {
        let source = Decoder::new(Cursor::new(bytes)).context("undecodable audio clip")?;
        let sink = Sink::try_new(&self.handle).context("could not open playback sink")?;
        sink.set_volume(volume);
        sink.append(source);
        Ok(sink)
    }
}
