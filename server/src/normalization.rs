use serde::{Deserialize, Deserializer};

/// Normalizes user-entered text by stripping surrounding whitespace and
/// decomposing it into Unicode Normalization Form D, so that searches and
/// exact-match filters behave consistently.
///
/// ```
/// use backend::normalization::normalize_text;
/// assert_eq!(normalize_text(" Tha\u{ef} "), "Thai\u{308}");
/// ```
pub fn normalize_text(text: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    text.as_ref().trim().nfd().to_string()
}

/// Deserializes a `String` after running it through `normalize_text`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_text(s))
}
