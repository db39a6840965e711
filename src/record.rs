//! # Record
//!
//! The unit the log stores: an opaque byte payload plus the offset the log
//! assigned to it. The log never interprets `value`; it only needs a
//! deterministic, reversible byte encoding to frame records in a store
//! file, and it overwrites `offset` on append.
//!
//! The encoding is bincode over the serde derives. The same derives give
//! the JSON shape the HTTP surface speaks.

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default)]
    pub offset: u64,
}

impl Record {
    /// A record carrying `value`, not yet assigned an offset.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }

    /// Encodes the record for storage in a store frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).wrap_err("failed to encode record")
    }

    /// Inverse of [`Record::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).wrap_err("failed to decode record")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut record = Record::new(b"hello world".to_vec());
        record.offset = 42;

        let bytes = record.encode().unwrap();
        let decoded = Record::decode(&bytes).unwrap();

        assert_eq!(decoded, record);
    }

    #[test]
    fn encoding_is_deterministic() {
        let record = Record::new(b"payload".to_vec());

        assert_eq!(record.encode().unwrap(), record.encode().unwrap());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Record::decode(&[0xff]).is_err());
    }
}
