//! Laughter detection and the Giphy random-GIF service.
//!
//! When most of the recent chat is laughing, post a laugh GIF. The detector
//! covers Latin and Greek laughter spellings; the antispam gate counts
//! messages since the last GIF rather than wall-clock time.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

/// How many of the last [`LAUGH_WINDOW`] messages must laugh.
pub const LAUGH_THRESHOLD: usize = 3;
pub const LAUGH_WINDOW: usize = 5;
/// Messages that must pass before another GIF is allowed.
pub const ANTISPAM_MESSAGES: i64 = 10;

const GIPHY_RANDOM_URL: &str = "https://api.giphy.com/v1/gifs/random";

/// Detect basic laughter expressions, Latin ("haha", "xaxa") and Greek
/// ("χαχα", "αχαχ") alike.
pub fn contains_laughter(text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        let patterns = [
            // Repeating 'a' runs: xaa, haaa, χααα.
            r"[ax]a{2,}",
            r"[χα]α{2,}",
            r"[ah]a{2,}",
            // Alternating runs: xaxa, haha, χαχα.
            r"[ax][ax]+a",
            r"[χα][χα]+α",
            r"[ah][ah]+a",
        ];
        Regex::new(&patterns.join("|")).unwrap()
    });
    re.is_match(&text.to_lowercase())
}

/// Whether a laugh GIF should fire: enough laughing messages in the window
/// and the antispam cooldown has expired.
pub fn should_send_gif(
    recent_texts: &[String],
    current_message_id: i64,
    last_gif_message_id: i64,
) -> bool {
    let laugh_count = recent_texts
        .iter()
        .take(LAUGH_WINDOW)
        .filter(|t| contains_laughter(t))
        .count();
    let cooldown_active = current_message_id - last_gif_message_id < ANTISPAM_MESSAGES;
    laugh_count >= LAUGH_THRESHOLD && !cooldown_active
}

#[derive(Debug, Deserialize)]
struct RandomGifResponse {
    data: GifData,
}

#[derive(Debug, Deserialize)]
struct GifData {
    images: GifImages,
}

#[derive(Debug, Deserialize)]
struct GifImages {
    original: GifRendition,
}

#[derive(Debug, Deserialize)]
struct GifRendition {
    url: String,
}

/// Random-GIF client. Without an API key every fetch is an inert `None`.
pub struct GiphyClient {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GiphyClient {
    pub fn new(api_key: Option<String>) -> Self {
        if api_key.is_none() {
            info!("No Giphy API key; GIF service deactivated");
        }
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch a random family-friendly GIF url for a tag.
    pub async fn random_gif(&self, tag: &str) -> Option<String> {
        let api_key = self.api_key.as_deref()?;

        let response = match self
            .client
            .get(GIPHY_RANDOM_URL)
            .query(&[("api_key", api_key), ("tag", tag), ("rating", "g")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Giphy request failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Giphy API returned status {}", response.status());
            return None;
        }

        match response.json::<RandomGifResponse>().await {
            Ok(gif) => Some(gif.data.images.original.url),
            Err(e) => {
                warn!("Failed to parse Giphy response: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_laughter() {
        assert!(contains_laughter("hahaha"));
        assert!(contains_laughter("xaxaxa"));
        assert!(contains_laughter("ahahah that's funny"));
        assert!(contains_laughter("HAHA"));
    }

    #[test]
    fn test_greek_laughter() {
        assert!(contains_laughter("χαχαχα"));
        assert!(contains_laughter("αχαχ"));
        assert!(contains_laughter("χααα"));
    }

    #[test]
    fn test_plain_text_is_not_laughter() {
        assert!(!contains_laughter("hello there"));
        assert!(!contains_laughter("what a day"));
        assert!(!contains_laughter(""));
    }

    #[test]
    fn test_gif_fires_at_threshold() {
        let texts: Vec<String> = ["haha", "χαχα", "ok", "hahaha", "sure"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(should_send_gif(&texts, 100, 0));
    }

    #[test]
    fn test_gif_below_threshold() {
        let texts: Vec<String> = ["haha", "ok", "sure", "χαχα", "right"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(!should_send_gif(&texts, 100, 0));
    }

    #[test]
    fn test_gif_cooldown() {
        let texts: Vec<String> = ["haha", "χαχα", "hahaha"].iter().map(|s| s.to_string()).collect();
        // 5 messages since the last GIF: still cooling down.
        assert!(!should_send_gif(&texts, 100, 95));
        // 10 messages: allowed again.
        assert!(should_send_gif(&texts, 105, 95));
    }

    #[tokio::test]
    async fn test_no_key_is_inert() {
        let client = GiphyClient::new(None);
        assert_eq!(client.random_gif("laugh").await, None);
    }
}
