//! Content classification for captured text
//!
//! Turns raw clipboard text into a [`ContentType`] and computes the
//! character/word counts stored alongside each record.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::history::ContentType;

/// Hex color: #RGB, #RRGGBB or #RRGGBBAA
static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([0-9A-Fa-f]{3}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").unwrap());

static RGB_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgb\s*\(\s*\d{1,3}\s*,\s*\d{1,3}\s*,\s*\d{1,3}\s*\)$").unwrap()
});

static RGBA_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba\s*\(\s*\d{1,3}\s*,\s*\d{1,3}\s*,\s*\d{1,3}\s*,\s*[0-9.]+\s*\)$").unwrap()
});

static HSL_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^hsl\s*\(\s*\d{1,3}\s*,\s*\d{1,3}%\s*,\s*\d{1,3}%\s*\)$").unwrap()
});

static HSLA_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^hsla\s*\(\s*\d{1,3}\s*,\s*\d{1,3}%\s*,\s*\d{1,3}%\s*,\s*[0-9.]+\s*\)$").unwrap()
});

/// Result of classifying a piece of text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub content_type: ContentType,
    pub char_count: i64,
    pub word_count: i64,
}

/// Classify text and compute its counts in one pass
pub fn classify(text: &str) -> Classification {
    Classification {
        content_type: detect_content_type(text),
        char_count: count_chars(text),
        word_count: count_words(text),
    }
}

/// Detect the semantic type of clipboard text
///
/// Order matters: JSON wins over URL, URL over color, and everything else
/// falls back to plain text.
pub fn detect_content_type(text: &str) -> ContentType {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ContentType::Text;
    }

    if is_json(trimmed) {
        return ContentType::Json;
    }

    if is_url(trimmed) {
        return ContentType::Url;
    }

    if is_color(trimmed) {
        return ContentType::Color;
    }

    ContentType::Text
}

fn is_json(trimmed: &str) -> bool {
    let object = trimmed.starts_with('{') && trimmed.ends_with('}');
    let array = trimmed.starts_with('[') && trimmed.ends_with(']');
    (object || array) && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

fn is_url(trimmed: &str) -> bool {
    trimmed.len() > 4 && (trimmed.starts_with("http") || trimmed.starts_with("www"))
}

/// Check the supported color literal grammars
pub fn is_color(text: &str) -> bool {
    [&HEX_COLOR, &RGB_COLOR, &RGBA_COLOR, &HSL_COLOR, &HSLA_COLOR]
        .iter()
        .any(|pattern| pattern.is_match(text))
}

/// Number of Unicode scalar values, not bytes
pub fn count_chars(text: &str) -> i64 {
    text.chars().count() as i64
}

/// CJK-aware word count
///
/// Every CJK ideograph, kana or hangul syllable is a word on its own. Runs of
/// letters, digits, `_` and `-` form a single word. Anything else separates.
pub fn count_words(text: &str) -> i64 {
    let mut count = 0;
    let mut in_word = false;

    for c in text.chars() {
        if is_cjk(c) {
            if in_word {
                count += 1;
                in_word = false;
            }
            count += 1;
        } else if is_word_char(c) {
            in_word = true;
        } else if in_word {
            count += 1;
            in_word = false;
        }
    }

    if in_word {
        count += 1;
    }

    count
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF      // unified ideographs
        | 0x3400..=0x4DBF    // extension A
        | 0x20000..=0x2A6DF  // extension B
        | 0x2A700..=0x2B73F  // extension C
        | 0x2B740..=0x2B81F  // extension D
        | 0x2B820..=0x2CEAF  // extension E
        | 0xF900..=0xFAFF    // compatibility ideographs
        | 0x2F800..=0x2FA1F  // compatibility supplement
        | 0x3040..=0x309F    // hiragana
        | 0x30A0..=0x30FF    // katakana
        | 0xAC00..=0xD7AF    // hangul syllables
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
