//! Local speech synthesis through the host's `espeak-ng`.
//!
//! The web client this replaces spoke with the browser's zh-TW voice at
//! pitch 1.1 and rate 0.9; the espeak-ng parameters below are the same
//! warm-voice tuning in its units (pitch 0-99 around a default of 50,
//! speed in words per minute around a default of 175).

use std::process::Stdio;

use tokio::process::Command;

const VOICE: &str = "cmn";
const PITCH: &str = "55";
const SPEED: &str = "160";

/// Speaks `text` aloud. A host without a synthesizer is a quiet no-op.
pub async fn speak(text: String) {
    if text.trim().is_empty() {
        return;
    }

    let result = Command::new("espeak-ng")
        .args(["-v", VOICE, "-p", PITCH, "-s", SPEED])
        .arg(&text)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if !status.success() => {
            tracing::debug!("espeak-ng exited with {status}");
        }
        Err(e) => {
            tracing::debug!("speech synthesis unavailable: {e}");
        }
        Ok(_) => {}
    }
}
