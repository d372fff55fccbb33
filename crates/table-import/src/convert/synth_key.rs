//! Synthetic surrogate keys for tables without a usable primary key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::source::{ResultColumn, SourceValue};

/// Separator appended after every value.
const SEPARATOR: char = '\u{2}';

/// Derive the key of a row: SHA-256 over the text of every non-blob result
/// column (empty for nulls), each followed by `\u{2}`, base64url without padding.
///
/// Depends only on the row's non-blob values in result-set order.
pub fn synth_key(columns: &[ResultColumn], row: &[SourceValue]) -> Vec<u8> {
    let mut text = String::new();
    for (column, value) in columns.iter().zip(row) {
        if column.wire_type.is_blob() {
            continue;
        }
        if let Some(v) = value.to_text() {
            text.push_str(&v);
        }
        text.push(SEPARATOR);
    }
    let digest = Sha256::digest(text.as_bytes());
    URL_SAFE_NO_PAD.encode(digest).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WireType;

    fn columns() -> Vec<ResultColumn> {
        vec![
            ResultColumn::new("id", WireType::Integer),
            ResultColumn::new("name", WireType::VarChar),
            ResultColumn::new("doc", WireType::Blob),
        ]
    }

    fn row(id: i64, name: Option<&str>, doc: &[u8]) -> Vec<SourceValue> {
        vec![
            SourceValue::Int(id),
            name.into(),
            SourceValue::Bytes(doc.to_vec()),
        ]
    }

    #[test]
    fn test_known_digest() {
        let key = synth_key(&columns(), &row(1, Some("a"), b""));
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest("1\u{2}a\u{2}".as_bytes()));
        assert_eq!(key, expected.into_bytes());
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(key.len(), 43);
    }

    #[test]
    fn test_blob_values_do_not_matter() {
        let a = synth_key(&columns(), &row(1, Some("a"), b"first"));
        let b = synth_key(&columns(), &row(1, Some("a"), b"second"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_value_change_changes_key() {
        let base = synth_key(&columns(), &row(1, Some("a"), b""));
        assert_ne!(base, synth_key(&columns(), &row(2, Some("a"), b"")));
        assert_ne!(base, synth_key(&columns(), &row(1, Some("b"), b"")));
        assert_ne!(base, synth_key(&columns(), &row(1, None, b"")));
    }

    #[test]
    fn test_null_and_empty_text_collide() {
        // nulls contribute no text, just the separator
        let null = synth_key(&columns(), &row(1, None, b""));
        let empty = synth_key(&columns(), &row(1, Some(""), b""));
        assert_eq!(null, empty);
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        let cols = vec![
            ResultColumn::new("a", WireType::VarChar),
            ResultColumn::new("b", WireType::VarChar),
        ];
        let left = synth_key(&cols, &[SourceValue::from("ab"), SourceValue::from("c")]);
        let right = synth_key(&cols, &[SourceValue::from("a"), SourceValue::from("bc")]);
        assert_ne!(left, right);
    }
}
