//! Caption template rendering.
//!
//! Tokens: `%n` name, `%c` comment, `%t` creation time, and `%C{text}`
//! which emits `text` only when the comment is non-empty. Anything else is
//! copied verbatim.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Format of `%t` in captions.
pub const CAPTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static CAPTION_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?:([nct])|C\{([^}]*)\})").expect("valid caption token regex"));

/// Renders `spec` for the given description values.
pub fn render_caption(
    spec: &str,
    name: &str,
    comment: &str,
    creation_time: NaiveDateTime,
) -> String {
    CAPTION_TOKEN_RE
        .replace_all(spec, |caps: &Captures<'_>| {
            if let Some(token) = caps.get(1) {
                return match token.as_str() {
                    "n" => name.to_string(),
                    "c" => comment.to_string(),
                    _ => creation_time.format(CAPTION_TIME_FORMAT).to_string(),
                };
            }
            match caps.get(2) {
                Some(block) if !comment.is_empty() => block.as_str().to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}
