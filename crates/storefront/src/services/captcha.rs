//! Captcha challenge engine.
//!
//! Issues short random challenges rendered as distorted SVG images and
//! validates one-time answers. Challenges live in an in-process TTL cache;
//! validation consumes the stored answer atomically, so a correlation id can
//! be answered at most once regardless of outcome. A wrong answer burns the
//! challenge rather than allowing another guess.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use moka::future::Cache;
use rand::Rng;
use uuid::Uuid;

use crate::config::CaptchaConfig;

/// Challenge alphabet; visually ambiguous glyphs (0/O, 1/I/l) are excluded.
const CAPTCHA_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const IMAGE_WIDTH: u32 = 120;
const IMAGE_HEIGHT: u32 = 40;

/// An issued challenge: the correlation id plus the rendered artifact.
///
/// The id must reach the client through a script-inaccessible channel (the
/// HTTP layer sets an `HttpOnly` cookie scoped to the auth path); only the
/// image belongs in the response body.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    pub id: String,
    /// `data:image/svg+xml;base64,...` URI of the rendered challenge.
    pub image: String,
}

/// Captcha engine holding the ephemeral challenge store.
#[derive(Clone)]
pub struct CaptchaService {
    challenges: Cache<String, String>,
    length: usize,
}

impl CaptchaService {
    /// Create an engine with the given challenge length and TTL.
    #[must_use]
    pub fn new(config: &CaptchaConfig) -> Self {
        Self {
            challenges: Cache::builder().time_to_live(config.ttl).build(),
            length: config.length,
        }
    }

    /// Issue a new challenge.
    pub async fn issue(&self) -> CaptchaChallenge {
        let text = random_text(self.length);
        let id = Uuid::new_v4().to_string();

        self.challenges.insert(id.clone(), text.clone()).await;
        tracing::debug!(challenge = %id, "issued captcha challenge");

        CaptchaChallenge {
            image: render_image(&text),
            id,
        }
    }

    /// Validate the user's answer for a correlation id.
    ///
    /// The stored challenge is removed before comparison, so a second attempt
    /// with the same id always fails. Comparison is case-insensitive.
    pub async fn validate(&self, id: &str, input: &str) -> bool {
        let Some(expected) = self.challenges.remove(id).await else {
            tracing::debug!(challenge = %id, "captcha absent, expired or already consumed");
            return false;
        };

        let matched = expected.eq_ignore_ascii_case(input);
        tracing::debug!(challenge = %id, matched, "captcha validated");
        matched
    }

    /// Plant a known challenge (tests only).
    #[cfg(test)]
    pub(crate) async fn insert_challenge(&self, id: &str, text: &str) {
        self.challenges.insert(id.to_owned(), text.to_owned()).await;
    }
}

/// Random challenge text from the restricted alphabet.
fn random_text(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(CAPTCHA_ALPHABET[rng.random_range(0..CAPTCHA_ALPHABET.len())]))
        .collect()
}

/// Render the challenge text into a jittered SVG and wrap it as a data URI.
fn render_image(text: &str) -> String {
    let mut rng = rand::rng();
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{IMAGE_WIDTH}\" height=\"{IMAGE_HEIGHT}\">\
         <rect width=\"100%\" height=\"100%\" fill=\"white\"/>"
    );

    for (i, c) in text.chars().enumerate() {
        let x = i as u32 * 25 + 8;
        let y = rng.random_range(24..36);
        let rotate = rng.random_range(-20..=20);
        let color = format!(
            "rgb({},{},{})",
            rng.random_range(0..160),
            rng.random_range(0..160),
            rng.random_range(0..160)
        );
        svg.push_str(&format!(
            "<text x=\"{x}\" y=\"{y}\" font-family=\"monospace\" font-size=\"28\" \
             font-weight=\"bold\" fill=\"{color}\" transform=\"rotate({rotate} {x} {y})\">{c}</text>"
        ));
    }

    // Noise lines over the glyphs.
    for _ in 0..5 {
        svg.push_str(&format!(
            "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"rgb({},{},{})\" stroke-opacity=\"0.5\"/>",
            rng.random_range(0..IMAGE_WIDTH),
            rng.random_range(0..IMAGE_HEIGHT),
            rng.random_range(0..IMAGE_WIDTH),
            rng.random_range(0..IMAGE_HEIGHT),
            rng.random_range(0..=255u16),
            rng.random_range(0..=255u16),
            rng.random_range(0..=255u16),
        ));
    }

    svg.push_str("</svg>");
    format!("data:image/svg+xml;base64,{}", BASE64.encode(svg))
}
