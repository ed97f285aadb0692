//! Text tokenization
//!
//! Lowercase, split on non-alphanumeric characters, drop single-character
//! fragments. Stemming and stopwords are deliberately absent.

/// Tokenize text into searchable terms
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() >= 2)
        .map(String::from)
        .collect()
}
