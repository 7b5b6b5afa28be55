//! Canonical keys for catalog labels.

use deunicode::deunicode;

/// Produces the canonical key for a display label.
///
/// Lowercases, transliterates to ASCII (dropping diacritics), collapses every
/// run of non-alphanumeric characters into a single hyphen and trims hyphens
/// from both ends. The result may be empty for labels with no alphanumerics.
pub fn normalize(label: &str) -> String {
    let ascii = deunicode(label).to_lowercase();

    let mut key = String::with_capacity(ascii.len());
    let mut pending_hyphen = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !key.is_empty() {
                key.push('-');
            }
            pending_hyphen = false;
            key.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    key
}
