use basalt_core::{Error, Key, Operation, Result, Value};

use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

use std::convert::TryFrom;

// Payload tag bytes
const TAG_PUT: u8 = 0x01;
const TAG_DELETE: u8 = 0x02;

// Frame header: length + checksum
const FRAME_HEADER_SIZE: usize = 8;
// Smallest payload: tag + key_len for an empty Delete key
const MIN_PAYLOAD_SIZE: usize = 1 + 4;

// Size limits for DoS protection
pub const MAX_KEY_SIZE: usize = 1024 * 1024; // 1MB
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const MAX_PAYLOAD_SIZE: usize = 1 + 4 + MAX_KEY_SIZE + 4 + MAX_VALUE_SIZE;

/// A record in the Write-Ahead Log
///
/// Each record is a single mutation, encoded as a length- and
/// checksum-prefixed frame:
///
/// ```text
/// [length:4 LE][checksum:4 LE][tag:1][key_len:4 LE][key][value_len:4 LE][value]
/// ```
///
/// - `length` counts the payload bytes only (everything after the checksum)
/// - `checksum` is a CRC32 over exactly the payload
/// - `tag` is `0x01` for Put and `0x02` for Delete
/// - Delete payloads end after the key; there is no value length field
///
/// ## Size Limits
///
/// Keys are limited to 1 MB and values to 10 MB. The constructors enforce
/// the limits, so `encode` cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Insert or update a key-value pair
    Put { key: Key, value: Value },
    /// Remove a key
    Delete { key: Key },
}

impl WalRecord {
    /// Creates a Put record
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the key or value exceeds its size limit.
    pub fn put(key: Key, value: Value) -> Result<Self> {
        check_key_size(&key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::Corruption(format!(
                "value size {} exceeds maximum {}",
                value.len(),
                MAX_VALUE_SIZE
            )));
        }
        Ok(Self::Put { key, value })
    }

    /// Creates a Delete record
    ///
    /// # Errors
    ///
    /// Returns `Error::Corruption` if the key exceeds its size limit.
    pub fn delete(key: Key) -> Result<Self> {
        check_key_size(&key)?;
        Ok(Self::Delete { key })
    }

    /// The key this record mutates
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// The kind of mutation
    pub fn operation(&self) -> Operation {
        match self {
            Self::Put { .. } => Operation::Put,
            Self::Delete { .. } => Operation::Delete,
        }
    }

    /// Encodes the record into its on-disk frame
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload_size();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);

        buf.put_u32_le(payload_len as u32);
        buf.put_u32_le(0); // checksum placeholder

        match self {
            Self::Put { key, value } => {
                buf.put_u8(TAG_PUT);
                buf.put_u32_le(key.len() as u32);
                buf.put_slice(key);
                buf.put_u32_le(value.len() as u32);
                buf.put_slice(value);
            }
            Self::Delete { key } => {
                buf.put_u8(TAG_DELETE);
                buf.put_u32_le(key.len() as u32);
                buf.put_slice(key);
            }
        }

        let mut hasher = Hasher::new();
        hasher.update(&buf[FRAME_HEADER_SIZE..]);
        let checksum = hasher.finalize();
        buf[4..8].copy_from_slice(&checksum.to_le_bytes());

        buf.to_vec()
    }

    /// Size of the encoded payload (excluding the 8-byte frame header)
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Put { key, value } => 1 + 4 + key.len() + 4 + value.len(),
            Self::Delete { key } => 1 + 4 + key.len(),
        }
    }

    /// Decodes a complete frame, verifying length and checksum
    ///
    /// ## Error Conditions
    ///
    /// Returns `Error::Corruption` if:
    /// - The frame is smaller than the minimum record
    /// - The length prefix disagrees with the actual frame size
    /// - The checksum does not match the payload
    /// - The tag byte is unknown
    /// - Key or value lengths exceed their limits or overrun the payload
    /// - Unexpected bytes trail the value
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < FRAME_HEADER_SIZE + MIN_PAYLOAD_SIZE {
            return Err(Error::Corruption(format!(
                "WAL record too small: {} bytes (minimum: {})",
                frame.len(),
                FRAME_HEADER_SIZE + MIN_PAYLOAD_SIZE
            )));
        }

        let mut cursor = frame;
        let length = cursor.get_u32_le() as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(Error::Corruption(format!(
                "WAL payload size {} exceeds maximum {}",
                length, MAX_PAYLOAD_SIZE
            )));
        }
        if frame.len() != FRAME_HEADER_SIZE + length {
            return Err(Error::Corruption(format!(
                "WAL record length mismatch: declared {} payload bytes but frame has {}",
                length,
                frame.len() - FRAME_HEADER_SIZE
            )));
        }

        let expected_checksum = cursor.get_u32_le();
        Self::decode_payload(cursor, expected_checksum)
    }

    /// Decodes a payload whose frame header has already been consumed
    pub fn decode_payload(payload: &[u8], expected_checksum: u32) -> Result<Self> {
        let mut hasher = Hasher::new();
        hasher.update(payload);
        let actual_checksum = hasher.finalize();
        if expected_checksum != actual_checksum {
            return Err(Error::Corruption(format!(
                "WAL record checksum mismatch: expected {:#x} but got {:#x}",
                expected_checksum, actual_checksum
            )));
        }

        if payload.len() < MIN_PAYLOAD_SIZE {
            return Err(Error::Corruption(
                "WAL payload truncated: missing tag or key length".to_string(),
            ));
        }

        let mut cursor = payload;
        let tag = cursor.get_u8();

        let key_len = cursor.get_u32_le() as usize;
        if key_len > MAX_KEY_SIZE {
            return Err(Error::Corruption(format!(
                "key size {} exceeds maximum {}",
                key_len, MAX_KEY_SIZE
            )));
        }
        if cursor.len() < key_len {
            return Err(Error::Corruption(format!(
                "WAL payload truncated: expected {} key bytes but only {} available",
                key_len,
                cursor.len()
            )));
        }
        let key = cursor[..key_len].to_vec();
        cursor.advance(key_len);

        let record = match tag {
            TAG_PUT => {
                if cursor.len() < 4 {
                    return Err(Error::Corruption(
                        "WAL payload truncated: missing value length".to_string(),
                    ));
                }
                let value_len = cursor.get_u32_le() as usize;
                if value_len > MAX_VALUE_SIZE {
                    return Err(Error::Corruption(format!(
                        "value size {} exceeds maximum {}",
                        value_len, MAX_VALUE_SIZE
                    )));
                }
                if cursor.len() < value_len {
                    return Err(Error::Corruption(format!(
                        "WAL payload truncated: expected {} value bytes but only {} available",
                        value_len,
                        cursor.len()
                    )));
                }
                let value = cursor[..value_len].to_vec();
                cursor.advance(value_len);
                Self::Put { key, value }
            }
            TAG_DELETE => Self::Delete { key },
            tag => {
                return Err(Error::Corruption(format!(
                    "invalid WAL record tag: {:#04x}",
                    tag
                )))
            }
        };

        if !cursor.is_empty() {
            return Err(Error::Corruption(format!(
                "WAL payload has {} unexpected trailing bytes",
                cursor.len()
            )));
        }

        Ok(record)
    }
}

fn check_key_size(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::Corruption(format!(
            "key size {} exceeds maximum {}",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

impl TryFrom<&[u8]> for WalRecord {
    type Error = Error;

    fn try_from(frame: &[u8]) -> Result<Self> {
        Self::decode(frame)
    }
}
