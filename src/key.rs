//! Internal keys and the user-key comparator contract.
//!
//! Every key stored in a table is an *internal key*: the user key followed by
//! an 8-byte trailer packing a 56-bit sequence number and an 8-bit kind tag.
//! Internal keys order by user key ascending (via the injected comparator),
//! then by trailer *descending*, so the most recent write for a user key
//! sorts first.

use std::cmp::Ordering;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

/// Largest sequence number an internal key trailer can carry. Sequence
/// numbers occupy the high 56 bits of the trailer.
pub const MAX_SEQ_NUM: u64 = (1 << 56) - 1;

/// Internal key kinds, stored in the low 8 bits of the trailer. Within a
/// single user key and sequence number, higher kinds sort first.
pub mod kind {
    pub const DELETE: u8 = 0;
    pub const SET: u8 = 1;
    pub const MERGE: u8 = 2;
    pub const RANGE_DELETE: u8 = 15;
    /// Upper bound on kinds; used to build seek keys that sort before every
    /// real entry for the same user key and sequence number.
    pub const MAX: u8 = 17;
}

/// A user key plus its trailer.
///
/// The wire encoding is `user_key || u64_le(seq_num << 8 | kind)`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InternalKey {
    pub user_key: Vec<u8>,
    pub trailer: u64,
}

impl InternalKey {
    pub fn new(user_key: impl Into<Vec<u8>>, seq_num: u64, kind: u8) -> Self {
        Self {
            user_key: user_key.into(),
            trailer: (seq_num << 8) | kind as u64,
        }
    }

    pub fn seq_num(&self) -> u64 {
        self.trailer >> 8
    }

    pub fn kind(&self) -> u8 {
        self.trailer as u8
    }

    /// Appends the encoded key to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.user_key);
        let mut trailer = [0u8; 8];
        LittleEndian::write_u64(&mut trailer, self.trailer);
        buf.extend_from_slice(&trailer);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.user_key.len() + 8);
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes an encoded internal key. Inputs shorter than the 8-byte
    /// trailer decode as an empty key, matching the tolerant decoding of the
    /// manifest format.
    pub fn decode(encoded: &[u8]) -> Self {
        if encoded.len() < 8 {
            return Self::default();
        }
        let n = encoded.len() - 8;
        Self {
            user_key: encoded[..n].to_vec(),
            trailer: LittleEndian::read_u64(&encoded[n..]),
        }
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}#{},{}",
            String::from_utf8_lossy(&self.user_key),
            self.seq_num(),
            self.kind()
        )
    }
}

/// User-key ordering injected into every operation that compares keys. No
/// process-wide comparator exists; callers pass one explicitly.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Name recorded in the manifest and verified when the store reopens.
    fn name(&self) -> &str;

    /// Diagnostic rendering of a user key for error messages.
    fn format_key(&self, key: &[u8]) -> String {
        String::from_utf8_lossy(key).into_owned()
    }
}

/// Lexicographic byte ordering, the default comparator.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "cinderdb.bytewise"
    }
}

/// Compares two internal keys: user keys via `cmp`, then the trailer as an
/// unsigned 64-bit integer, descending. Higher sequence numbers sort first,
/// and within a sequence number higher kinds sort first.
pub fn internal_compare(cmp: &dyn Comparator, a: &InternalKey, b: &InternalKey) -> Ordering {
    cmp.compare(&a.user_key, &b.user_key)
        .then_with(|| b.trailer.cmp(&a.trailer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_layout() {
        let key = InternalKey::new(b"apple".to_vec(), 0x0123456789abcd, kind::SET);
        let encoded = key.encode();
        assert_eq!(&encoded[..5], b"apple");
        // Little-endian u64 of (seq << 8 | kind): kind lands in the first
        // trailer byte.
        assert_eq!(
            &encoded[5..],
            &[0x01, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23, 0x01]
        );
        assert_eq!(key.seq_num(), 0x0123456789abcd);
        assert_eq!(key.kind(), kind::SET);
    }

    #[test]
    fn test_roundtrip() {
        let key = InternalKey::new(b"k".to_vec(), 42, kind::DELETE);
        assert_eq!(InternalKey::decode(&key.encode()), key);
    }

    #[test]
    fn test_decode_short_input() {
        assert_eq!(InternalKey::decode(b"short"), InternalKey::default());
    }

    #[test]
    fn test_ordering_same_user_key() {
        let cmp = BytewiseComparator;
        let newer = InternalKey::new(b"k".to_vec(), 10, kind::SET);
        let older = InternalKey::new(b"k".to_vec(), 5, kind::SET);
        // Larger sequence number sorts first.
        assert_eq!(internal_compare(&cmp, &newer, &older), Ordering::Less);
        assert_eq!(internal_compare(&cmp, &older, &newer), Ordering::Greater);
    }

    #[test]
    fn test_ordering_kind_tiebreak() {
        let cmp = BytewiseComparator;
        let set = InternalKey::new(b"k".to_vec(), 7, kind::SET);
        let del = InternalKey::new(b"k".to_vec(), 7, kind::DELETE);
        // Equal sequence numbers: larger kind sorts first.
        assert_eq!(internal_compare(&cmp, &set, &del), Ordering::Less);
    }

    #[test]
    fn test_ordering_user_key_dominates() {
        let cmp = BytewiseComparator;
        let a = InternalKey::new(b"a".to_vec(), 1, kind::SET);
        let b = InternalKey::new(b"b".to_vec(), 100, kind::SET);
        assert_eq!(internal_compare(&cmp, &a, &b), Ordering::Less);
    }
}
