//! # Record Format
//!
//! A [`Record`] is one version of a key: the key, an optional value (absent
//! for tombstones), the logical timestamp of the write and an optional
//! time-to-live.
//!
//! ## Encoding
//!
//! ```text
//! Record (big-endian):
//!   [key_len: i32] [key] [timestamp: i64]
//!   (live only) [value_len: i64] [value]
//!   [ttl: i64]
//! ```
//!
//! A negative timestamp marks a tombstone; its absolute value is the real
//! timestamp. A TTL of `-1` means "no expiry".
//!
//! ## Ordering
//!
//! Records are ordered by:
//! 1. key (ascending, unsigned byte-wise)
//! 2. timestamp (descending - newer first)

use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes};

use crate::clock::{self, Clock};
use crate::error::{Error, Result};

/// On-disk TTL value meaning "never expires".
pub const NO_TTL: i64 = -1;

/// Size of the smallest possible encoded record (empty-key tombstone).
pub const MIN_RECORD_SIZE: usize = 4 + 8 + 8;

/// A versioned key-value entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Bytes,
    value: Option<Bytes>,
    timestamp: i64,
    ttl: Option<u64>,
}

impl Record {
    /// Creates a live record stamped with the clock's next timestamp.
    pub fn of(clock: &Clock, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::from_parts(key.into(), Some(value.into()), clock.now(), None)
    }

    /// Creates a live record that expires `ttl_ms` milliseconds after the write.
    pub fn with_ttl(
        clock: &Clock,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl_ms: u64,
    ) -> Self {
        Self::from_parts(key.into(), Some(value.into()), clock.now(), Some(ttl_ms))
    }

    /// Creates a tombstone for `key`.
    pub fn removed(clock: &Clock, key: impl Into<Bytes>) -> Self {
        Self::from_parts(key.into(), None, clock.now(), None)
    }

    /// Creates a record from explicit parts.
    ///
    /// `value == None` builds a tombstone. `timestamp` must be positive for
    /// the record to be encodable.
    pub fn from_parts(key: Bytes, value: Option<Bytes>, timestamp: i64, ttl: Option<u64>) -> Self {
        Self { key, value, timestamp, ttl }
    }

    /// Returns the key.
    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// Returns the value, or `None` for a tombstone.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Returns the logical timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the timestamp in wall-clock milliseconds.
    pub fn timestamp_millis(&self) -> i64 {
        clock::to_millis(self.timestamp)
    }

    /// Returns the time-to-live in milliseconds, if any.
    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// Returns `true` if this record was written by a delete.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns `true` if the record carries a TTL that elapsed before `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.ttl {
            Some(ttl) => {
                let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
                now_ms > self.timestamp_millis().saturating_add(ttl)
            }
            None => false,
        }
    }

    /// Returns `true` if the record is dead at `now_ms` (tombstoned or expired).
    pub fn is_removed_at(&self, now_ms: i64) -> bool {
        self.is_tombstone() || self.is_expired_at(now_ms)
    }

    /// Returns `true` if the record is dead right now.
    ///
    /// Evaluated on every call: a stored record turns dead once its TTL
    /// elapses, without being modified.
    pub fn is_removed(&self) -> bool {
        self.is_removed_at(clock::wall_millis())
    }

    /// Returns the size of the encoded record in bytes.
    pub fn size_in_bytes(&self) -> usize {
        let value_part = match &self.value {
            Some(value) => 8 + value.len(),
            None => 0,
        };
        4 + self.key.len() + 8 + value_part + 8
    }

    /// Compares two records by key ascending, then by recency descending.
    pub fn cmp_order(&self, other: &Record) -> Ordering {
        self.key.cmp(&other.key).then_with(|| other.timestamp.abs().cmp(&self.timestamp.abs()))
    }

    /// Appends the encoded record to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let key_len = i32::try_from(self.key.len())
            .map_err(|_| Error::invalid_argument("key longer than i32::MAX bytes"))?;
        if self.timestamp <= 0 {
            return Err(Error::invalid_argument(format!(
                "timestamp must be positive, got {}",
                self.timestamp
            )));
        }

        buf.put_i32(key_len);
        buf.put_slice(&self.key);
        match &self.value {
            Some(value) => {
                buf.put_i64(self.timestamp);
                buf.put_i64(value.len() as i64);
                buf.put_slice(value);
            }
            None => buf.put_i64(-self.timestamp),
        }
        buf.put_i64(self.encoded_ttl());
        Ok(())
    }

    /// Encodes the record into a new buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size_in_bytes());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes a record occupying exactly `data`.
    ///
    /// Key and value are zero-copy slices of `data`.
    pub fn decode(data: Bytes) -> Result<Self> {
        let total = data.len();
        if total < MIN_RECORD_SIZE {
            return Err(Error::corruption(format!("record too short: {} bytes", total)));
        }

        let mut cursor = &data[..];
        let key_len = cursor.get_i32();
        let key_len = usize::try_from(key_len)
            .map_err(|_| Error::corruption(format!("negative key length {}", key_len)))?;
        if total < 4 + key_len + 16 {
            return Err(Error::corruption("key length exceeds record bounds"));
        }
        let key = data.slice(4..4 + key_len);
        cursor.advance(key_len);

        let signed_timestamp = cursor.get_i64();
        let (value, timestamp) = if signed_timestamp < 0 {
            if cursor.remaining() != 8 {
                return Err(Error::corruption("tombstone record has trailing bytes"));
            }
            let timestamp = signed_timestamp
                .checked_neg()
                .ok_or_else(|| Error::corruption("tombstone timestamp out of range"))?;
            (None, timestamp)
        } else {
            if cursor.remaining() < 16 {
                return Err(Error::corruption("live record missing value length"));
            }
            let value_len = cursor.get_i64();
            let value_len = usize::try_from(value_len)
                .map_err(|_| Error::corruption(format!("negative value length {}", value_len)))?;
            if cursor.remaining() != value_len + 8 {
                return Err(Error::corruption("value length does not match record bounds"));
            }
            let start = 4 + key_len + 16;
            let value = data.slice(start..start + value_len);
            cursor.advance(value_len);
            (Some(value), signed_timestamp)
        };

        let ttl = match cursor.get_i64() {
            NO_TTL => None,
            ttl if ttl >= 0 => Some(ttl as u64),
            ttl => return Err(Error::corruption(format!("invalid ttl {}", ttl))),
        };

        Ok(Self { key, value, timestamp, ttl })
    }

    /// Returns the TTL as stored on disk.
    fn encoded_ttl(&self) -> i64 {
        self.ttl.map_or(NO_TTL, |ttl| i64::try_from(ttl).unwrap_or(i64::MAX))
    }
}

/// Reads the key of an encoded record without decoding the rest.
pub(crate) fn decode_key(data: &Bytes) -> Result<Bytes> {
    if data.len() < 4 {
        return Err(Error::corruption("record too short for key length"));
    }
    let key_len = (&data[..4]).get_i32();
    let key_len = usize::try_from(key_len)
        .map_err(|_| Error::corruption(format!("negative key length {}", key_len)))?;
    if data.len() < 4 + key_len {
        return Err(Error::corruption("key length exceeds record bounds"));
    }
    Ok(data.slice(4..4 + key_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: i64 = 1_700_000_000_000 * clock::TICKS_PER_MILLI;

    fn live(key: &'static [u8], value: &'static [u8], ts: i64) -> Record {
        Record::from_parts(Bytes::from_static(key), Some(Bytes::from_static(value)), ts, None)
    }

    #[test]
    fn test_encoding_layout() {
        let record = live(b"ab", b"xyz", 5);
        let encoded = record.encode().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&2i32.to_be_bytes());
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&5i64.to_be_bytes());
        expected.extend_from_slice(&3i64.to_be_bytes());
        expected.extend_from_slice(b"xyz");
        expected.extend_from_slice(&(-1i64).to_be_bytes());

        assert_eq!(encoded, expected);
        assert_eq!(encoded.len(), record.size_in_bytes());
    }

    #[test]
    fn test_tombstone_encoding() {
        let record = Record::from_parts(Bytes::from_static(b"k"), None, 42, Some(7));
        let encoded = record.encode().unwrap();

        assert_eq!(encoded.len(), 4 + 1 + 8 + 8);
        assert_eq!(&encoded[5..13], &(-42i64).to_be_bytes());

        let decoded = Record::decode(Bytes::from(encoded)).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.timestamp(), 42);
        assert_eq!(decoded.ttl(), Some(7));
    }

    #[test]
    fn test_decode_live_with_ttl() {
        let record = Record::from_parts(
            Bytes::from_static(b"key"),
            Some(Bytes::from_static(b"value")),
            TS,
            Some(1500),
        );
        let decoded = Record::decode(Bytes::from(record.encode().unwrap())).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let encoded = live(b"key", b"value", 9).encode().unwrap();
        let truncated = Bytes::copy_from_slice(&encoded[..encoded.len() - 1]);
        assert!(Record::decode(truncated).unwrap_err().is_corruption());

        let mut bad_len = encoded.clone();
        bad_len[0..4].copy_from_slice(&1000i32.to_be_bytes());
        assert!(Record::decode(Bytes::from(bad_len)).is_err());
    }

    #[test]
    fn test_decode_rejects_min_tombstone_timestamp() {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(&1i32.to_be_bytes());
        encoded.extend_from_slice(b"k");
        encoded.extend_from_slice(&i64::MIN.to_be_bytes());
        encoded.extend_from_slice(&NO_TTL.to_be_bytes());

        let err = Record::decode(Bytes::from(encoded)).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_encode_rejects_zero_timestamp() {
        let record = Record::from_parts(Bytes::from_static(b"k"), None, 0, None);
        assert!(record.encode().is_err());
    }

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(live(b"key", b"value", 1).size_in_bytes(), 4 + 3 + 8 + 8 + 5 + 8);
        let tomb = Record::from_parts(Bytes::from_static(b"key"), None, 1, None);
        assert_eq!(tomb.size_in_bytes(), 4 + 3 + 8 + 8);
    }

    #[test]
    fn test_ordering() {
        let a_old = live(b"a", b"1", 10);
        let a_new = live(b"a", b"2", 20);
        let b = live(b"b", b"3", 5);

        assert_eq!(a_new.cmp_order(&a_old), Ordering::Less);
        assert_eq!(a_old.cmp_order(&b), Ordering::Less);
        assert_eq!(a_new.cmp_order(&b), Ordering::Less);

        // Unsigned byte-wise key comparison
        let high = live(&[0xFF], b"x", 1);
        let low = live(&[0x01], b"x", 1);
        assert_eq!(low.cmp_order(&high), Ordering::Less);
    }

    #[test]
    fn test_expiry() {
        let clock = Clock::new();
        let record = Record::with_ttl(&clock, "k", "v", 100);
        let written = record.timestamp_millis();

        assert!(!record.is_removed_at(written));
        assert!(!record.is_removed_at(written + 100));
        assert!(record.is_removed_at(written + 101));

        let forever = Record::of(&clock, "k", "v");
        assert!(!forever.is_removed_at(i64::MAX));

        let dead = Record::removed(&clock, "k");
        assert!(dead.is_removed());
    }

    #[test]
    fn test_decode_key() {
        let encoded = Bytes::from(live(b"hello", b"world", 3).encode().unwrap());
        assert_eq!(decode_key(&encoded).unwrap(), Bytes::from_static(b"hello"));
        assert!(decode_key(&Bytes::from_static(&[0, 0])).is_err());
    }
}
