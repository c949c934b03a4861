//! Typed payloads carried inside the encrypted channel.
//!
//! These are the plaintexts of control-flavoured envelope frames: clock
//! synchronization timestamps, node name registration, broadcast key
//! delivery, and the 1-byte-prefixed node commands inside `ControlData`.
//! All integers are little-endian.

use crate::{
    PUBLIC_KEY_LEN,
    errors::{ProtocolError, Result},
};

/// Clock synchronization request: the node's transmit timestamp in µs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRequest {
    /// Node transmit time (t1), microseconds on the node clock
    pub t1: u64,
}

impl ClockRequest {
    /// Serialized payload length.
    pub const LEN: usize = 8;

    /// Serialize.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        self.t1.to_le_bytes()
    }

    /// Parse.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::LengthMismatch` unless exactly 8 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; Self::LEN] =
            bytes.try_into().map_err(|_| ProtocolError::LengthMismatch {
                what: "clock request",
                expected: Self::LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { t1: u64::from_le_bytes(arr) })
    }
}

/// Clock synchronization response: the request timestamp echoed back plus
/// the gateway's receive and transmit timestamps.
///
/// The node records its own receive time (t4) and computes
/// offset `((t2 − t1) + (t3 − t4)) / 2` and
/// round-trip `(t4 − t1) − (t3 − t2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockResponse {
    /// Node transmit time echoed from the request
    pub t1: u64,
    /// Gateway receive time, microseconds on the gateway clock
    pub t2: u64,
    /// Gateway transmit time, microseconds on the gateway clock
    pub t3: u64,
}

impl ClockResponse {
    /// Serialized payload length.
    pub const LEN: usize = 24;

    /// Serialize.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..8].copy_from_slice(&self.t1.to_le_bytes());
        out[8..16].copy_from_slice(&self.t2.to_le_bytes());
        out[16..24].copy_from_slice(&self.t3.to_le_bytes());
        out
    }

    /// Parse.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::LengthMismatch` unless exactly 24 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(ProtocolError::LengthMismatch {
                what: "clock response",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let word = |i: usize| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&bytes[i..i + 8]);
            u64::from_le_bytes(arr)
        };
        Ok(Self { t1: word(0), t2: word(8), t3: word(16) })
    }
}

/// Node name registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNameSet {
    /// Requested name, UTF-8, at most [`crate::MAX_NODE_NAME_LEN`] bytes
    pub name: String,
}

impl NodeNameSet {
    /// Serialize. Length is validated by the gateway, not here; a node
    /// sending an over-long name gets a result code back instead of a
    /// local error.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    /// Parse.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidUtf8` if the payload is not UTF-8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let name = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidUtf8("node name"))?
            .to_owned();
        Ok(Self { name })
    }
}

/// Node name registration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeNameResult {
    /// One of the `NodeNameResult` code constants
    pub code: i8,
}

impl NodeNameResult {
    /// Name accepted and recorded.
    pub const ACCEPTED: i8 = 0;
    /// Another registered node already claims this name.
    pub const ALREADY_TAKEN: i8 = -1;
    /// Name exceeds [`crate::MAX_NODE_NAME_LEN`] bytes.
    pub const TOO_LONG: i8 = -2;
    /// Empty name.
    pub const EMPTY: i8 = -3;
    /// Gateway failed to encode the response.
    pub const ENCODE_ERROR: i8 = -4;

    /// Serialize.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 1] {
        [self.code as u8]
    }

    /// Parse.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::LengthMismatch` unless exactly 1 byte
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 1 {
            return Err(ProtocolError::LengthMismatch {
                what: "name result",
                expected: 1,
                actual: bytes.len(),
            });
        }
        Ok(Self { code: bytes[0] as i8 })
    }
}

/// Broadcast key delivery: epoch plus the 32-byte key, sent under the
/// recipient's session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastKeyResponse {
    /// Broadcast key epoch
    pub epoch: u8,
    /// The broadcast key itself
    pub key: [u8; PUBLIC_KEY_LEN],
}

impl BroadcastKeyResponse {
    /// Serialized payload length.
    pub const LEN: usize = 1 + PUBLIC_KEY_LEN;

    /// Serialize.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.epoch;
        out[1..].copy_from_slice(&self.key);
        out
    }

    /// Parse.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::LengthMismatch` unless exactly 33 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(ProtocolError::LengthMismatch {
                what: "broadcast key response",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; PUBLIC_KEY_LEN];
        key.copy_from_slice(&bytes[1..]);
        Ok(Self { epoch: bytes[0], key })
    }
}

/// Protocol-level commands carried as a 1-byte prefix inside upstream
/// `ControlData` payloads. Payloads that do not start with a recognized
/// command byte are application control data and pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Ask the gateway host to restart
    RestartGateway,
    /// Declare or clear the sleepy capability
    SetSleepy(bool),
}

/// Command byte for a gateway restart request.
pub const CMD_RESTART: u8 = 0x01;
/// Command byte for a sleepy-capability update.
pub const CMD_SLEEPY: u8 = 0x02;

impl NodeCommand {
    /// Recognize a protocol command at the head of a control payload.
    /// Returns `None` for application control data.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [CMD_RESTART] => Some(Self::RestartGateway),
            [CMD_SLEEPY, flag] => Some(Self::SetSleepy(*flag != 0)),
            _ => None,
        }
    }

    /// Serialize to a control payload.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::RestartGateway => vec![CMD_RESTART],
            Self::SetSleepy(flag) => vec![CMD_SLEEPY, u8::from(*flag)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_request_round_trip() {
        let req = ClockRequest { t1: 0x0102_0304_0506_0708 };
        assert_eq!(ClockRequest::from_bytes(&req.to_bytes()).unwrap(), req);
    }

    #[test]
    fn clock_response_round_trip() {
        let resp = ClockResponse { t1: 1, t2: 2_000_000, t3: 2_000_500 };
        assert_eq!(ClockResponse::from_bytes(&resp.to_bytes()).unwrap(), resp);
    }

    #[test]
    fn clock_response_rejects_short_payload() {
        assert!(ClockResponse::from_bytes(&[0u8; 23]).is_err());
    }

    #[test]
    fn node_name_round_trip() {
        let set = NodeNameSet { name: "kitchen".to_owned() };
        assert_eq!(NodeNameSet::from_bytes(&set.to_bytes()).unwrap(), set);
    }

    #[test]
    fn node_name_rejects_invalid_utf8() {
        assert!(NodeNameSet::from_bytes(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn name_result_codes_round_trip() {
        for code in [
            NodeNameResult::ACCEPTED,
            NodeNameResult::ALREADY_TAKEN,
            NodeNameResult::TOO_LONG,
            NodeNameResult::EMPTY,
            NodeNameResult::ENCODE_ERROR,
        ] {
            let result = NodeNameResult { code };
            assert_eq!(NodeNameResult::from_bytes(&result.to_bytes()).unwrap().code, code);
        }
    }

    #[test]
    fn broadcast_key_round_trip() {
        let resp = BroadcastKeyResponse { epoch: 3, key: [0x5A; PUBLIC_KEY_LEN] };
        assert_eq!(BroadcastKeyResponse::from_bytes(&resp.to_bytes()).unwrap(), resp);
    }

    #[test]
    fn command_parse_and_serialize() {
        assert_eq!(NodeCommand::parse(&[CMD_RESTART]), Some(NodeCommand::RestartGateway));
        assert_eq!(NodeCommand::parse(&[CMD_SLEEPY, 1]), Some(NodeCommand::SetSleepy(true)));
        assert_eq!(NodeCommand::parse(&[CMD_SLEEPY, 0]), Some(NodeCommand::SetSleepy(false)));
        // Application payloads pass through
        assert_eq!(NodeCommand::parse(b"temperature"), None);
        assert_eq!(NodeCommand::parse(&[]), None);
        for cmd in [NodeCommand::RestartGateway, NodeCommand::SetSleepy(true)] {
            assert_eq!(NodeCommand::parse(&cmd.to_bytes()), Some(cmd));
        }
    }
}
