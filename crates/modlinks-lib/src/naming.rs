use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::mirror::error::MirrorError;

// Everything outside printable ASCII, plus the apostrophe. Applied after NFD
// decomposition so accented letters lose their combining marks instead of
// vanishing entirely.
static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^ -&(-~]").expect("character filter regex is valid"));

// The runs that survive into the canonical name: a lowercase run with an
// optional leading capital, a lone capital, or a run of digits. Separators,
// punctuation and anything else between runs is dropped.
static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Z]?[a-z]+)|[A-Z]|\d+").expect("token regex is valid"));

/// Derive the canonical, filesystem-safe name for a mod from its declared
/// display name.
///
/// The result is the PascalCase concatenation of the recognizable word and
/// digit runs in the name. Deterministic and pure; the same display name
/// always maps to the same canonical name.
pub fn canonical_name(display: &str) -> Result<String, MirrorError> {
    let decomposed: String = display.nfd().collect();
    let ascii = DISALLOWED.replace_all(&decomposed, "");

    let mut name = String::with_capacity(ascii.len());
    for token in TOKEN.find_iter(&ascii) {
        let mut chars = token.as_str().chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.push_str(chars.as_str());
        }
    }

    if name.is_empty() {
        return Err(MirrorError::EmptyCanonicalName {
            display: display.to_string(),
        });
    }

    Ok(name)
}
