//! Log record types and serialization for the file-backed store.

use crate::backend::Namespace;
use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying a Tidepool log record.
pub const LOG_MAGIC: [u8; 4] = *b"TPLG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// Fixed header size: magic (4) + version (2) + type (1) + namespace (1) +
/// payload length (4).
pub(crate) const HEADER_SIZE: usize = 12;

/// Trailing CRC size.
pub(crate) const CRC_SIZE: usize = 4;

/// Type of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// Store (insert or overwrite) a key-value pair.
    Put = 1,
    /// Remove a key.
    Delete = 2,
    /// Remove every key in the namespace.
    Clear = 3,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Clear),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single mutation in the append-only store log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Store a key-value pair.
    Put {
        /// Target namespace.
        ns: Namespace,
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Target namespace.
        ns: Namespace,
        /// Record key.
        key: Vec<u8>,
    },
    /// Remove every key in a namespace.
    Clear {
        /// Target namespace.
        ns: Namespace,
    },
}

impl LogRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Put { .. } => LogRecordType::Put,
            Self::Delete { .. } => LogRecordType::Delete,
            Self::Clear { .. } => LogRecordType::Clear,
        }
    }

    /// Returns the namespace this record targets.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Put { ns, .. } | Self::Delete { ns, .. } | Self::Clear { ns } => *ns,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// Keys and values carry a 4-byte length prefix each.
    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Put { key, value, .. } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
            }
            Self::Delete { key, .. } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
            Self::Clear { .. } => {}
        }
        buf
    }

    /// Serializes the full record: header, payload, trailing CRC.
    ///
    /// The CRC covers the header and payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.encode_payload();

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&LOG_MAGIC);
        buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
        buf.push(self.record_type().as_byte());
        buf.push(self.namespace().as_byte());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a record payload for the given type and namespace.
    ///
    /// # Errors
    ///
    /// Returns a corruption error on truncated fields or trailing bytes.
    pub(crate) fn decode_payload(
        record_type: LogRecordType,
        ns: Namespace,
        payload: &[u8],
    ) -> StoreResult<Self> {
        let mut cursor = 0usize;

        let mut read_field = |payload: &[u8]| -> StoreResult<Vec<u8>> {
            if payload.len() < cursor + 4 {
                return Err(StoreError::corrupted("truncated field length"));
            }
            let len = u32::from_le_bytes([
                payload[cursor],
                payload[cursor + 1],
                payload[cursor + 2],
                payload[cursor + 3],
            ]) as usize;
            cursor += 4;
            if payload.len() < cursor + len {
                return Err(StoreError::corrupted("truncated field data"));
            }
            let data = payload[cursor..cursor + len].to_vec();
            cursor += len;
            Ok(data)
        };

        let record = match record_type {
            LogRecordType::Put => {
                let key = read_field(payload)?;
                let value = read_field(payload)?;
                Self::Put { ns, key, value }
            }
            LogRecordType::Delete => {
                let key = read_field(payload)?;
                Self::Delete { ns, key }
            }
            LogRecordType::Clear => Self::Clear { ns },
        };

        if cursor != payload.len() {
            return Err(StoreError::corrupted(format!(
                "trailing bytes in {:?} record: consumed {}, payload {}",
                record_type,
                cursor,
                payload.len()
            )));
        }

        Ok(record)
    }
}

/// Computes CRC32 checksum for data.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    // Simple CRC32 implementation (IEEE polynomial)
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_roundtrip() {
        for t in [LogRecordType::Put, LogRecordType::Delete, LogRecordType::Clear] {
            assert_eq!(LogRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(LogRecordType::from_byte(0), None);
        assert_eq!(LogRecordType::from_byte(42), None);
    }

    #[test]
    fn crc32_known_value() {
        // Standard CRC32 check value for "123456789"
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn crc32_empty() {
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn encode_starts_with_magic() {
        let record = LogRecord::Clear {
            ns: Namespace::Meta,
        };
        let bytes = record.encode();
        assert_eq!(&bytes[0..4], &LOG_MAGIC);
        assert_eq!(bytes.len(), HEADER_SIZE + CRC_SIZE);
    }

    #[test]
    fn put_record_roundtrip() {
        let record = LogRecord::Put {
            ns: Namespace::PendingActions,
            key: b"action-1".to_vec(),
            value: b"payload bytes".to_vec(),
        };
        let bytes = record.encode();

        let payload = &bytes[HEADER_SIZE..bytes.len() - CRC_SIZE];
        let decoded =
            LogRecord::decode_payload(LogRecordType::Put, Namespace::PendingActions, payload)
                .unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn delete_record_roundtrip() {
        let record = LogRecord::Delete {
            ns: Namespace::CachedEntries,
            key: b"quote:123".to_vec(),
        };
        let bytes = record.encode();

        let payload = &bytes[HEADER_SIZE..bytes.len() - CRC_SIZE];
        let decoded =
            LogRecord::decode_payload(LogRecordType::Delete, Namespace::CachedEntries, payload)
                .unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let record = LogRecord::Put {
            ns: Namespace::Meta,
            key: b"key".to_vec(),
            value: b"value".to_vec(),
        };
        let bytes = record.encode();
        let payload = &bytes[HEADER_SIZE..bytes.len() - CRC_SIZE];

        let result = LogRecord::decode_payload(
            LogRecordType::Put,
            Namespace::Meta,
            &payload[..payload.len() - 2],
        );
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let record = LogRecord::Delete {
            ns: Namespace::Meta,
            key: b"key".to_vec(),
        };
        let bytes = record.encode();
        let mut payload = bytes[HEADER_SIZE..bytes.len() - CRC_SIZE].to_vec();
        payload.push(0xFF);

        let result = LogRecord::decode_payload(LogRecordType::Delete, Namespace::Meta, &payload);
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn crc_detects_flipped_bit() {
        let record = LogRecord::Put {
            ns: Namespace::Meta,
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        };
        let mut bytes = record.encode();
        let body_len = bytes.len() - CRC_SIZE;
        bytes[HEADER_SIZE] ^= 0x01;

        let stored = u32::from_le_bytes(bytes[body_len..].try_into().unwrap());
        let computed = compute_crc32(&bytes[..body_len]);
        assert_ne!(stored, computed);
    }
}
