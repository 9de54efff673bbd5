//! Text-to-speech against a Fish Speech server.
//!
//! Replying `tts` to a text message voices it; the per-chat `tts_voice`
//! setting picks the reference voice. Telegram wants OGG Opus, the server
//! produces WAV, ffmpeg bridges the two.

use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ListReferencesResponse {
    success: bool,
    reference_ids: Vec<String>,
}

pub struct TtsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl TtsClient {
    /// `endpoint` is the base URL of the Fish Speech server,
    /// e.g., "http://localhost:8880"
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the available voice reference ids.
    pub async fn list_voices(&self) -> Result<Vec<String>, String> {
        let response = self
            .client
            .get(format!("{}/v1/references/list", self.endpoint))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("Failed to fetch voice list: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("Voice list error {}", response.status()));
        }

        let resp: ListReferencesResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse voice list: {e}"))?;
        if !resp.success {
            return Err("Voice list API returned success=false".to_string());
        }
        Ok(resp.reference_ids)
    }

    /// Generate speech from text as OGG Opus bytes suitable for a Telegram
    /// voice message.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, String> {
        let preview: String = text.chars().take(50).collect();
        info!("TTS: \"{}\"", preview);

        let reference_id = voice.filter(|v| !v.is_empty()).unwrap_or("xtts_female");

        let response = self
            .client
            .post(format!("{}/v1/tts", self.endpoint))
            .json(&serde_json::json!({
                "text": text,
                "format": "wav",
                "reference_id": reference_id
            }))
            .send()
            .await
            .map_err(|e| format!("TTS request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("TTS error {}: {}", status, body));
        }

        let wav_data = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read TTS response: {e}"))?;

        debug!("Got {} bytes of WAV audio", wav_data.len());

        let ogg_data = convert_wav_to_ogg(&wav_data)?;
        info!("Generated {} bytes of voice audio", ogg_data.len());
        Ok(ogg_data)
    }
}

/// Convert WAV audio to OGG Opus, padding 300ms of silence at the start
/// (Telegram cuts off the first ~200ms when playing voice messages).
fn convert_wav_to_ogg(wav_data: &[u8]) -> Result<Vec<u8>, String> {
    let temp_dir = std::env::temp_dir();
    let input_path = temp_dir.join(format!("tts_input_{}.wav", std::process::id()));
    let output_path = temp_dir.join(format!("tts_output_{}.ogg", std::process::id()));

    std::fs::write(&input_path, wav_data)
        .map_err(|e| format!("Failed to write temp WAV: {e}"))?;

    let output = Command::new("ffmpeg")
        .args([
            "-y",
            "-f", "lavfi",
            "-i", "anullsrc=r=44100:cl=mono",
            "-i",
            input_path.to_str().unwrap_or_default(),
            "-filter_complex", "[0]atrim=0:0.3[silence];[silence][1:a]concat=n=2:v=0:a=1",
            "-c:a",
            "libopus",
            "-b:a",
            "64k",
            output_path.to_str().unwrap_or_default(),
        ])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .map_err(|e| format!("Failed to run ffmpeg: {e}"))?;

    let _ = std::fs::remove_file(&input_path);

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = std::fs::remove_file(&output_path);
        return Err(format!("ffmpeg conversion failed: {}", stderr));
    }

    let ogg_data = std::fs::read(&output_path)
        .map_err(|e| format!("Failed to read OGG output: {e}"))?;
    let _ = std::fs::remove_file(&output_path);

    debug!("Converted WAV ({} bytes) to OGG ({} bytes)", wav_data.len(), ogg_data.len());
    Ok(ogg_data)
}

#[cfg(test)]
mod tests {
    use super::TtsClient;

    #[test]
    fn test_tts_client_creation() {
        let client = TtsClient::new("http://localhost:8880".to_string());
        assert_eq!(client.endpoint, "http://localhost:8880");
    }
}
