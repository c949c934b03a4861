//! Message-type tags and their wire classification.
//!
//! Every frame opens with a 1-byte tag. The tag decides three things:
//! the frame layout, which key protects the payload (session key,
//! broadcast key, or none), and the direction byte that goes into the
//! AEAD nonce.

use crate::errors::ProtocolError;

/// Direction of a frame relative to the gateway.
///
/// The direction byte is mixed into the AEAD nonce so that an upstream
/// and a downstream frame with the same counter can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Node to gateway
    Up,
    /// Gateway to a single node
    Down,
    /// Gateway to all nodes under the broadcast key
    Broadcast,
}

impl Direction {
    /// Nonce byte for this direction.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Up => 0x00,
            Self::Down => 0x01,
            Self::Broadcast => 0x02,
        }
    }
}

/// Which key protects a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keying {
    /// Per-node session key
    Session,
    /// Gateway-issued broadcast key
    Broadcast,
    /// No encryption (handshake, invalidate, clear data)
    Clear,
}

/// The 1-byte message-type tags.
///
/// Tag values are wire constants. `BroadcastKeyRequest` carries its own
/// tag (0x28) rather than sharing 0x08 with HA discovery, so no frame
/// needs context to be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Encrypted upstream sensor data
    SensorData = 0x01,
    /// Encrypted downstream value write
    DownstreamDataSet = 0x02,
    /// Encrypted upstream control data
    ControlData = 0x03,
    /// Encrypted downstream control data
    DownstreamCtrlData = 0x04,
    /// Clock synchronization request (node timestamp)
    ClockRequest = 0x05,
    /// Clock synchronization response (three timestamps)
    ClockResponse = 0x06,
    /// Node name registration request
    NodeNameSet = 0x07,
    /// Home-assistant discovery payload forwarded verbatim
    HaDiscovery = 0x08,
    /// Unencrypted upstream sensor data (counter only)
    ClearNodeData = 0x11,
    /// Encrypted downstream value read
    DownstreamDataGet = 0x12,
    /// Node name registration result code
    NodeNameResult = 0x17,
    /// Broadcast key delivery under the session key
    BroadcastKeyResponse = 0x18,
    /// Node request for the current broadcast key
    BroadcastKeyRequest = 0x28,
    /// Upstream sensor data under the broadcast key
    SensorBroadcastData = 0x81,
    /// Downstream value write under the broadcast key
    DownstreamBroadcastDataSet = 0x82,
    /// Downstream control data under the broadcast key
    DownstreamBroadcastCtrlData = 0x84,
    /// Downstream value read under the broadcast key
    DownstreamBroadcastDataGet = 0x92,
    /// Session invalidation notice, HMAC under the network key
    InvalidateKey = 0xFB,
    /// Gateway half of the handshake
    ServerHello = 0xFE,
    /// Node half of the handshake
    ClientHello = 0xFF,
}

impl MessageType {
    /// Tag byte for this type.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a tag byte.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownType` for any unassigned value
    pub fn from_tag(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            0x01 => Ok(Self::SensorData),
            0x02 => Ok(Self::DownstreamDataSet),
            0x03 => Ok(Self::ControlData),
            0x04 => Ok(Self::DownstreamCtrlData),
            0x05 => Ok(Self::ClockRequest),
            0x06 => Ok(Self::ClockResponse),
            0x07 => Ok(Self::NodeNameSet),
            0x08 => Ok(Self::HaDiscovery),
            0x11 => Ok(Self::ClearNodeData),
            0x12 => Ok(Self::DownstreamDataGet),
            0x17 => Ok(Self::NodeNameResult),
            0x18 => Ok(Self::BroadcastKeyResponse),
            0x28 => Ok(Self::BroadcastKeyRequest),
            0x81 => Ok(Self::SensorBroadcastData),
            0x82 => Ok(Self::DownstreamBroadcastDataSet),
            0x84 => Ok(Self::DownstreamBroadcastCtrlData),
            0x92 => Ok(Self::DownstreamBroadcastDataGet),
            0xFB => Ok(Self::InvalidateKey),
            0xFE => Ok(Self::ServerHello),
            0xFF => Ok(Self::ClientHello),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    /// Which key protects this frame.
    #[must_use]
    pub fn keying(self) -> Keying {
        match self {
            Self::SensorData
            | Self::DownstreamDataSet
            | Self::ControlData
            | Self::DownstreamCtrlData
            | Self::ClockRequest
            | Self::ClockResponse
            | Self::NodeNameSet
            | Self::HaDiscovery
            | Self::DownstreamDataGet
            | Self::NodeNameResult
            | Self::BroadcastKeyResponse
            | Self::BroadcastKeyRequest => Keying::Session,
            Self::SensorBroadcastData
            | Self::DownstreamBroadcastDataSet
            | Self::DownstreamBroadcastCtrlData
            | Self::DownstreamBroadcastDataGet => Keying::Broadcast,
            Self::ClearNodeData | Self::InvalidateKey | Self::ServerHello | Self::ClientHello => {
                Keying::Clear
            },
        }
    }

    /// Direction of this frame relative to the gateway.
    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            Self::SensorData
            | Self::ControlData
            | Self::ClockRequest
            | Self::NodeNameSet
            | Self::HaDiscovery
            | Self::ClearNodeData
            | Self::BroadcastKeyRequest
            | Self::ClientHello => Direction::Up,
            Self::DownstreamDataSet
            | Self::DownstreamCtrlData
            | Self::ClockResponse
            | Self::NodeNameResult
            | Self::BroadcastKeyResponse
            | Self::DownstreamDataGet
            | Self::InvalidateKey
            | Self::ServerHello => Direction::Down,
            Self::SensorBroadcastData
            | Self::DownstreamBroadcastDataSet
            | Self::DownstreamBroadcastCtrlData
            | Self::DownstreamBroadcastDataGet => Direction::Broadcast,
        }
    }

    /// Whether frames of this type use the common encrypted envelope
    /// layout (`tag ‖ key_id ‖ counter ‖ nonce ‖ ciphertext ‖ auth tag`).
    #[must_use]
    pub fn is_envelope(self) -> bool {
        !matches!(self.keying(), Keying::Clear)
    }
}

/// Reason codes carried by an invalidate-key frame.
///
/// Sent in the clear (the recipient may no longer hold the session key)
/// and authenticated with the network key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InvalidateReason {
    /// Internal failure, e.g. node table at capacity
    UnknownError = 0x00,
    /// Decrypt, HMAC, or repeated counter failure
    WrongData = 0x01,
    /// Data frame from an address with no session
    UnregisteredNode = 0x02,
    /// Session exceeded its maximum key validity
    KeyExpired = 0x03,
    /// Administrative removal
    Kicked = 0x04,
}

impl InvalidateReason {
    /// Wire byte for this reason.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a reason byte.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownReason` for any unassigned value
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x00 => Ok(Self::UnknownError),
            0x01 => Ok(Self::WrongData),
            0x02 => Ok(Self::UnregisteredNode),
            0x03 => Ok(Self::KeyExpired),
            0x04 => Ok(Self::Kicked),
            other => Err(ProtocolError::UnknownReason(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip_for_all_types() {
        let all = [
            MessageType::SensorData,
            MessageType::DownstreamDataSet,
            MessageType::ControlData,
            MessageType::DownstreamCtrlData,
            MessageType::ClockRequest,
            MessageType::ClockResponse,
            MessageType::NodeNameSet,
            MessageType::HaDiscovery,
            MessageType::ClearNodeData,
            MessageType::DownstreamDataGet,
            MessageType::NodeNameResult,
            MessageType::BroadcastKeyResponse,
            MessageType::BroadcastKeyRequest,
            MessageType::SensorBroadcastData,
            MessageType::DownstreamBroadcastDataSet,
            MessageType::DownstreamBroadcastCtrlData,
            MessageType::DownstreamBroadcastDataGet,
            MessageType::InvalidateKey,
            MessageType::ServerHello,
            MessageType::ClientHello,
        ];
        for ty in all {
            assert_eq!(MessageType::from_tag(ty.tag()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(MessageType::from_tag(0x42), Err(ProtocolError::UnknownType(0x42))));
    }

    #[test]
    fn discovery_and_broadcast_key_request_have_distinct_tags() {
        assert_ne!(MessageType::HaDiscovery.tag(), MessageType::BroadcastKeyRequest.tag());
    }

    #[test]
    fn broadcast_types_use_broadcast_keying_and_direction() {
        for ty in [
            MessageType::SensorBroadcastData,
            MessageType::DownstreamBroadcastDataSet,
            MessageType::DownstreamBroadcastCtrlData,
            MessageType::DownstreamBroadcastDataGet,
        ] {
            assert_eq!(ty.keying(), Keying::Broadcast);
            assert_eq!(ty.direction(), Direction::Broadcast);
        }
    }

    #[test]
    fn direction_bytes_are_stable() {
        assert_eq!(Direction::Up.byte(), 0x00);
        assert_eq!(Direction::Down.byte(), 0x01);
        assert_eq!(Direction::Broadcast.byte(), 0x02);
    }

    #[test]
    fn reason_codes_round_trip() {
        for reason in [
            InvalidateReason::UnknownError,
            InvalidateReason::WrongData,
            InvalidateReason::UnregisteredNode,
            InvalidateReason::KeyExpired,
            InvalidateReason::Kicked,
        ] {
            assert_eq!(InvalidateReason::from_code(reason.code()).unwrap(), reason);
        }
        assert!(InvalidateReason::from_code(0x99).is_err());
    }
}
