//! Persistent gateway settings.
//!
//! Settings are serialized as a single CBOR record with a little-endian
//! u16 length prefix, matching the node side's format.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted settings record.
const MAX_RECORD_LEN: usize = 4096;

/// Errors from loading or saving settings records.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying read or write failed
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record failed to serialize
    #[error("settings encoding failed: {0}")]
    Encode(String),

    /// Record failed to deserialize
    #[error("settings decoding failed: {0}")]
    Decode(String),

    /// Length prefix exceeds the accepted bound
    #[error("settings record of {0} bytes exceeds the {MAX_RECORD_LEN}-byte bound")]
    RecordTooLarge(usize),
}

/// What the gateway persists across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Radio channel
    pub channel: u8,
    /// Pre-shared network key
    pub network_key: [u8; 32],
    /// Network name, used as the discovery topic prefix
    pub network_name: String,
}

impl GatewaySettings {
    /// Write as a length-prefixed CBOR record.
    pub fn save(&self, writer: &mut impl Write) -> Result<(), StoreError> {
        write_record(self, writer)
    }

    /// Read a record written by [`save`](Self::save).
    pub fn load(reader: &mut impl Read) -> Result<Self, StoreError> {
        read_record(reader)
    }
}

/// Serialize any settings record with the shared length-prefixed layout.
pub(crate) fn write_record<T: Serialize>(
    value: &T,
    writer: &mut impl Write,
) -> Result<(), StoreError> {
    let mut body = Vec::new();
    ciborium::into_writer(value, &mut body).map_err(|e| StoreError::Encode(e.to_string()))?;
    if body.len() > MAX_RECORD_LEN {
        return Err(StoreError::RecordTooLarge(body.len()));
    }

    writer.write_all(&(body.len() as u16).to_le_bytes())?;
    writer.write_all(&body)?;
    Ok(())
}

/// Deserialize a record written by [`write_record`].
pub(crate) fn read_record<T: for<'de> Deserialize<'de>>(
    reader: &mut impl Read,
) -> Result<T, StoreError> {
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix)?;
    let len = u16::from_le_bytes(prefix) as usize;
    if len > MAX_RECORD_LEN {
        return Err(StoreError::RecordTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    ciborium::from_reader(body.as_slice()).map_err(|e| StoreError::Decode(e.to_string()))
}
