//! Identifier/path codec
//!
//! Documents live in commit trees at `data/<table>/<encoded-id>.json` (or
//! `data/<encoded-id>.json` when the identifier has no table prefix). The
//! encoding maps each path-hostile character to a mnemonic `_NAME_` token so
//! that any legal identifier becomes a legal tree path, and decoding is the
//! exact inverse.

use chronicle_core::{DocumentId, Error, Result, DATA_PREFIX};

/// Character-to-token table. Order matters only for readability.
const ENCODINGS: &[(char, &str)] = &[
    (':', "_COLON_"),
    ('/', "_SLASH_"),
    ('?', "_QMARK_"),
    ('*', "_STAR_"),
    ('\\', "_BSLASH_"),
    ('<', "_LT_"),
    ('>', "_GT_"),
    ('|', "_PIPE_"),
    ('"', "_QUOTE_"),
    ('%', "_PCT_"),
    ('#', "_HASH_"),
    ('&', "_AMP_"),
    ('=', "_EQ_"),
    ('+', "_PLUS_"),
    ('@', "_AT_"),
    (' ', "_SPACE_"),
];

/// Encode one path segment, replacing path-hostile characters with tokens
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match ENCODINGS.iter().find(|(ch, _)| *ch == c) {
            Some((_, token)) => out.push_str(token),
            None => out.push(c),
        }
    }
    out
}

/// Decode one path segment.
///
/// A `_` starts a token candidate when another `_` follows; an all-uppercase
/// candidate that is not in the table is malformed and fails with
/// [`Error::PathDecode`]. Plain underscores pass through unchanged.
pub fn decode_segment(segment: &str) -> Result<String> {
    let chars: Vec<char> = segment.chars().collect();
    let mut out = String::with_capacity(segment.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '_' {
            if let Some(off) = chars[i + 1..].iter().position(|&c| c == '_') {
                let j = i + 1 + off;
                let name: String = chars[i + 1..j].iter().collect();
                let token = format!("_{name}_");
                if let Some((c, _)) = ENCODINGS.iter().find(|(_, t)| *t == token) {
                    out.push(*c);
                    i = j + 1;
                    continue;
                }
                if !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase()) {
                    return Err(Error::PathDecode(format!(
                        "unknown token {token} in segment {segment}"
                    )));
                }
            }
            out.push('_');
            i += 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    Ok(out)
}

/// Tree path of a document: `data/<table>/<encoded-id>.json`
pub fn doc_path(id: &DocumentId) -> String {
    let encoded = encode_segment(id.as_str());
    match id.table() {
        Some(table) => format!("{DATA_PREFIX}/{}/{encoded}.json", encode_segment(table)),
        None => format!("{DATA_PREFIX}/{encoded}.json"),
    }
}

/// Tree-path prefix matching every document whose identifier starts with
/// `id_prefix`. The prefix splits on the first `:` the same way ids do, so
/// `user:` covers the whole `user` table and `user:1` covers `user:1`,
/// `user:10`, ...
pub fn prefix_path(id_prefix: &str) -> String {
    match id_prefix.split_once(':') {
        Some((table, _)) if !table.is_empty() => {
            format!(
                "{DATA_PREFIX}/{}/{}",
                encode_segment(table),
                encode_segment(id_prefix)
            )
        }
        _ => format!("{DATA_PREFIX}/{}", encode_segment(id_prefix)),
    }
}

/// Tree-path prefix of a whole table directory
pub fn table_path(table: &str) -> String {
    format!("{DATA_PREFIX}/{}/", encode_segment(table))
}

/// Recover a document identifier from a tree path produced by [`doc_path`]
pub fn id_from_path(path: &str) -> Result<DocumentId> {
    let rel = path
        .strip_prefix(&format!("{DATA_PREFIX}/"))
        .ok_or_else(|| Error::PathInvalid(format!("outside data prefix: {path}")))?;
    let file = rel.rsplit('/').next().unwrap_or(rel);
    let stem = file
        .strip_suffix(".json")
        .ok_or_else(|| Error::PathInvalid(format!("not a document file: {path}")))?;
    DocumentId::parse(&decode_segment(stem)?)
}

/// Reject paths the engine must never store
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(Error::PathInvalid(format!("leading slash: {path}")));
    }
    if path.is_empty() {
        return Err(Error::PathInvalid("empty path".to_string()));
    }
    Ok(())
}
