// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Escaping of hostnames and service names into Graphite path segments.

use regex::bytes::{Captures, Regex};
use std::sync::LazyLock;

// ASCII-only: bytes of multi-byte UTF-8 sequences count as non-word bytes.
#[allow(clippy::expect_used)]
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)\W+").expect("non-word pattern is valid"));

/// Escapes `raw` so it can be used as one dot-separated segment of a metric path.
///
/// Every maximal run of bytes outside `[A-Za-z0-9_]` is replaced by the
/// percent-encoding of each of its bytes, with uppercase hex digits.
///
/// # Examples
///
/// ```
/// use cgroup_graphite::escape::escape;
///
/// assert_eq!(escape("my-service"), "my%2Dservice");
/// assert_eq!(escape("a b"), "a%20b");
/// assert_eq!(escape("already_ok"), "already_ok");
/// ```
#[must_use]
pub fn escape(raw: &str) -> String {
    let escaped = NON_WORD.replace_all(raw.as_bytes(), |caps: &Captures<'_>| {
        percent_encode(&caps[0])
    });
    // Every byte left in place is ASCII, as is every replacement.
    String::from_utf8_lossy(&escaped).into_owned()
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn percent_encode(run: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(run.len() * 3);
    for byte in run {
        encoded.extend_from_slice(&[
            b'%',
            HEX_DIGITS[usize::from(byte >> 4)],
            HEX_DIGITS[usize::from(byte & 0x0f)],
        ]);
    }
    encoded
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_known_values() {
        assert_eq!(escape("my-service"), "my%2Dservice");
        assert_eq!(escape("a b"), "a%20b");
        assert_eq!(escape("already_ok"), "already_ok");
    }

    #[test]
    fn test_escape_encodes_whole_run() {
        assert_eq!(escape("web.01--eu"), "web%2E01%2D%2Deu");
        assert_eq!(escape("..."), "%2E%2E%2E");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_escape_multibyte_characters_bytewise() {
        // U+00E9 is 0xC3 0xA9 in UTF-8
        assert_eq!(escape("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn test_escape_uses_uppercase_hex() {
        assert_eq!(escape("a:b"), "a%3Ab");
        assert_eq!(escape("a\u{7f}"), "a%7F");
    }

    #[test]
    fn test_percent_encode_every_byte() {
        for byte in 0..=u8::MAX {
            assert_eq!(percent_encode(&[byte]), format!("%{byte:02X}").into_bytes());
        }
        assert_eq!(percent_encode(&[0x00, 0xff, 0x2e]), b"%00%FF%2E".to_vec());
        assert!(percent_encode(&[]).is_empty());
    }

    fn is_word(byte: u8) -> bool {
        byte.is_ascii_alphanumeric() || byte == b'_'
    }

    proptest! {
        #[test]
        fn escape_output_alphabet(s in any::<String>()) {
            let escaped = escape(&s);
            prop_assert!(escaped
                .bytes()
                .all(|b| is_word(b) || b == b'%'));
        }

        #[test]
        fn escape_expands_each_non_word_byte_to_three(s in any::<String>()) {
            let non_word = s.bytes().filter(|b| !is_word(*b)).count();
            let word = s.len() - non_word;
            prop_assert_eq!(escape(&s).len(), word + 3 * non_word);
        }

        #[test]
        fn escape_leaves_word_strings_untouched(s in "[A-Za-z0-9_]{0,32}") {
            prop_assert_eq!(escape(&s), s);
        }
    }
}
