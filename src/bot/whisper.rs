//! Voice transcription using whisper-rs.
//!
//! Telegram voice notes arrive as OGG Opus; ffmpeg converts them to the
//! 16 kHz mono PCM Whisper expects.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Speech-to-text collaborator used by the voice branch of dispatch.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[u8]) -> Result<String, String>;
}

pub struct Whisper {
    ctx: Arc<WhisperContext>,
}

impl Whisper {
    /// Load a Whisper model from a .bin file.
    pub fn new(model_path: &Path) -> Result<Self, String> {
        info!("Loading Whisper model from {:?}", model_path);
        if !model_path.exists() {
            return Err(format!("Model file not found: {:?}", model_path));
        }

        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        Ok(Self { ctx: Arc::new(ctx) })
    }
}

impl Transcriber for Whisper {
    fn transcribe(&self, audio: &[u8]) -> Result<String, String> {
        debug!("Transcribing {} bytes of audio", audio.len());
        let pcm = convert_ogg_to_pcm(audio)?;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_translate(false);
        params.set_no_timestamps(true);

        state
            .full(params, &pcm)
            .map_err(|e| format!("Whisper transcription failed: {e}"))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            if let Ok(s) = segment.to_str() {
                text.push_str(s);
                text.push(' ');
            }
        }

        let text = text.trim().to_string();
        info!("Transcribed {} chars", text.len());
        Ok(text)
    }
}

/// Convert OGG Opus to 16 kHz mono f32 PCM via ffmpeg.
fn convert_ogg_to_pcm(ogg_data: &[u8]) -> Result<Vec<f32>, String> {
    // ffmpeg needs seekable input for OGG, so go through a temp file.
    let input_path = std::env::temp_dir().join(format!("voice_input_{}.ogg", std::process::id()));
    std::fs::write(&input_path, ogg_data).map_err(|e| format!("Failed to write temp input: {e}"))?;

    let output = Command::new("ffmpeg")
        .args([
            "-i",
            input_path.to_str().unwrap_or_default(),
            "-ar",
            "16000",
            "-ac",
            "1",
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-y",
            "pipe:1",
        ])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {e}"))?;

    let _ = std::fs::remove_file(&input_path);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffmpeg failed: {stderr}"));
    }

    let samples: Vec<f32> = output
        .stdout
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect();

    debug!("Converted to {} f32 samples", samples.len());
    Ok(samples)
}
