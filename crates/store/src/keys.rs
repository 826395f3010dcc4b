//! Key encoding shared by every record type.
//!
//! Free-form key material (URIs, CORS origins, grant handles) is
//! percent-escaped so it never contains characters the table service
//! reserves in keys. Ordered child collections use fixed-width decimal
//! sequence keys so lexicographic order equals insertion order.

use std::{borrow::Cow, fmt};

use idtable_storage::{TableError, TableResult};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Partition holding every API resource primary row.
pub const API_RESOURCE_PARTITION: &str = "apiresource";

/// Partition holding every identity resource primary row.
pub const IDENTITY_RESOURCE_PARTITION: &str = "identityresource";

/// Partition holding every client primary row.
pub const CLIENT_PARTITION: &str = "client";

/// Everything except RFC 3986 unreserved characters is escaped.
const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Width of an encoded sequence key.
pub const SEQUENCE_WIDTH: usize = 4;

/// Largest sequence number that fits in [`SEQUENCE_WIDTH`] digits.
pub const MAX_SEQUENCE: u32 = 9_999;

/// Percent-escapes free-form text for use as a partition or sort key.
///
/// # Examples
///
/// ```
/// use idtable_store::keys::{decode_key_part, encode_key_part};
///
/// let encoded = encode_key_part("https://app.example.com/cb?x=1");
/// assert_eq!(encoded, "https%3A%2F%2Fapp.example.com%2Fcb%3Fx%3D1");
/// assert_eq!(decode_key_part(&encoded).unwrap(), "https://app.example.com/cb?x=1");
/// ```
#[must_use]
pub fn encode_key_part(raw: &str) -> String {
    utf8_percent_encode(raw, KEY_ESCAPE).to_string()
}

/// Reverses [`encode_key_part`].
///
/// # Errors
///
/// Returns [`TableError::Decode`] when the unescaped bytes are not UTF-8.
pub fn decode_key_part(encoded: &str) -> TableResult<String> {
    percent_decode_str(encoded)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|e| TableError::decode_with_source(format!("invalid escaped key {encoded:?}"), e))
}

/// Position of a child in an ordered collection, validated to fit the
/// fixed-width sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(u32);

impl Sequence {
    /// Validates a 0-based position.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Decode`] for positions above [`MAX_SEQUENCE`].
    pub fn new(position: usize) -> TableResult<Self> {
        u32::try_from(position)
            .ok()
            .filter(|n| *n <= MAX_SEQUENCE)
            .map(Self)
            .ok_or_else(|| {
                TableError::decode(format!(
                    "sequence {position} exceeds the {SEQUENCE_WIDTH}-digit limit of {MAX_SEQUENCE}"
                ))
            })
    }

    /// Returns the raw position.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Encodes the position as a zero-padded sort key.
    #[must_use]
    pub fn encode(self) -> String {
        format!("{:0width$}", self.0, width = SEQUENCE_WIDTH)
    }

    /// Parses a sort key written by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Decode`] unless `key` is exactly
    /// [`SEQUENCE_WIDTH`] ASCII digits.
    pub fn decode(key: &str) -> TableResult<Self> {
        if key.len() != SEQUENCE_WIDTH || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TableError::decode(format!("malformed sequence key {key:?}")));
        }
        key.parse::<u32>()
            .map(Self)
            .map_err(|e| TableError::decode_with_source(format!("malformed sequence key {key:?}"), e))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = SEQUENCE_WIDTH)
    }
}

/// Partition key for the claims of one API scope.
///
/// Both parts are escaped, so a `|` inside a resource or scope name cannot
/// shift the separator.
#[must_use]
pub fn scope_claim_partition(resource: &str, scope: &str) -> String {
    format!("{}|{}", encode_key_part(resource), encode_key_part(scope))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use idtable_storage::assert_decode_error;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_sequence_encoding_is_fixed_width() {
        assert_eq!(Sequence::new(0).unwrap().encode(), "0000");
        assert_eq!(Sequence::new(42).unwrap().encode(), "0042");
        assert_eq!(Sequence::new(9_999).unwrap().encode(), "9999");
        assert_eq!(Sequence::new(7).unwrap().to_string(), "0007");
    }

    #[test]
    fn test_sequence_over_limit_is_rejected() {
        assert_decode_error!(Sequence::new(10_000));
    }

    #[test]
    fn test_malformed_sequence_key_is_decode_error() {
        assert_decode_error!(Sequence::decode("abc"));
        assert_decode_error!(Sequence::decode("12"));
        assert_decode_error!(Sequence::decode("+123"));
        assert_decode_error!(Sequence::decode("00001"));
        assert_eq!(Sequence::decode("0003").unwrap().get(), 3);
    }

    #[test]
    fn test_invalid_utf8_escape_is_decode_error() {
        assert_decode_error!(decode_key_part("%FF%FE"));
    }

    #[test]
    fn test_unreserved_characters_pass_through() {
        assert_eq!(encode_key_part("api1.read-write_~"), "api1.read-write_~");
        assert_eq!(encode_key_part("a b+c"), "a%20b%2Bc");
    }

    #[test]
    fn test_scope_claim_partition() {
        assert_eq!(scope_claim_partition("api1", "scope"), "api1|scope");
    }

    #[test]
    fn test_scope_claim_partition_escapes_separator() {
        assert_eq!(scope_claim_partition("a|b", "c"), "a%7Cb|c");
        assert_eq!(scope_claim_partition("a", "b|c"), "a|b%7Cc");
        assert_ne!(scope_claim_partition("a|b", "c"), scope_claim_partition("a", "b|c"));
    }

    proptest! {
        /// Escaped text always decodes back to the original.
        #[test]
        fn escape_round_trip(raw in any::<String>()) {
            let encoded = encode_key_part(&raw);
            prop_assert_eq!(decode_key_part(&encoded).expect("valid escape"), raw);
        }

        /// Escaped keys never contain characters reserved in table keys.
        #[test]
        fn escaped_keys_avoid_reserved_characters(raw in any::<String>()) {
            let encoded = encode_key_part(&raw);
            prop_assert!(!encoded.contains(['/', '\\', '#', '?', '|']));
            prop_assert!(encoded.is_ascii());
        }

        /// Sequence keys sort in numeric order.
        #[test]
        fn sequence_keys_preserve_order(a in 0..=MAX_SEQUENCE as usize, b in 0..=MAX_SEQUENCE as usize) {
            let enc_a = Sequence::new(a).expect("in range").encode();
            let enc_b = Sequence::new(b).expect("in range").encode();
            prop_assert_eq!(a.cmp(&b), enc_a.cmp(&enc_b));
            prop_assert_eq!(Sequence::decode(&enc_a).expect("decodes").get() as usize, a);
        }
    }
}
