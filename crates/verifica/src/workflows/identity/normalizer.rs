use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical form used for watch-list screening: diacritics stripped,
/// non-letters dropped, whitespace collapsed, uppercased.
pub(crate) fn normalize_screening_name(value: &str) -> String {
    let stripped: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
