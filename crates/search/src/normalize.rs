//! Accent folding
//!
//! Diacritic-insensitive matching requires the same normalisation at index
//! and query time: NFD decomposition, combining marks stripped, lowercased.
//! `"José"` and `"jose"` fold to the same form.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold a string for accent-insensitive comparison
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}
