//! Object name helpers: capped label joins and random name suffixes.

/// Label values are limited to 63 characters.
pub const LABEL_VALUE_MAX: usize = 63;

const MAX_GENERATED_BASE: usize = LABEL_VALUE_MAX - SUFFIX_LEN;
const SUFFIX_LEN: usize = 5;
// Alphanumerics without vowels and look-alike characters.
const ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Joins `entries` with commas in reverse order (last inserted first),
/// stopping before the first entry that would push the value past the label
/// limit. Entries are never split.
pub fn join_capped<S: AsRef<str>>(entries: &[S]) -> String {
    let mut out = String::new();
    for entry in entries.iter().rev().map(AsRef::as_ref) {
        if out.len() + entry.len() >= LABEL_VALUE_MAX {
            break;
        }
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(entry);
    }
    out
}

/// Appends a random five character suffix to `base`, truncating the base so
/// the result stays a valid object name.
pub fn generate_name(base: &str) -> String {
    let mut cut = base.len().min(MAX_GENERATED_BASE);
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    let bytes = uuid::Uuid::new_v4().into_bytes();
    let suffix: String = bytes[..SUFFIX_LEN].iter().map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char).collect();
    format!("{}{}", &base[..cut], suffix)
}
