//! 6-byte radio addresses.

use std::fmt;

use crate::errors::ProtocolError;

/// A 6-byte link-layer address identifying one radio peer.
///
/// One active session exists per address on the gateway; the all-ones
/// address is the broadcast destination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Address length in bytes.
    pub const LEN: usize = 6;

    /// The broadcast destination address (`ff:ff:ff:ff:ff:ff`).
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this is the broadcast destination.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }

    /// Parse from a 6-byte slice.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::LengthMismatch` if the slice is not 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let arr: [u8; 6] =
            bytes.try_into().map_err(|_| ProtocolError::LengthMismatch {
                what: "mac address",
                expected: Self::LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

// Debug prints the colon form too; a raw byte array tells you nothing in a
// log line.
impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_colon_separated_hex() {
        let mac = MacAddress::new([0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0x01]);
        assert_eq!(mac.to_string(), "aa:aa:aa:aa:aa:01");
    }

    #[test]
    fn broadcast_detection() {
        assert!(MacAddress::BROADCAST.is_broadcast());
        assert!(!MacAddress::new([0; 6]).is_broadcast());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(MacAddress::from_slice(&[1, 2, 3]).is_err());
        assert!(MacAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7]).is_err());
        assert!(MacAddress::from_slice(&[1, 2, 3, 4, 5, 6]).is_ok());
    }
}
