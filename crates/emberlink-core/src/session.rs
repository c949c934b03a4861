//! Per-peer session state: handshake, key epochs, and AEAD envelopes.
//!
//! Both ends run the same algorithm with asymmetric roles. The node
//! initiates with a `ClientHello`; the gateway authenticates it against
//! the pre-shared network key, completes the ephemeral x25519 exchange,
//! assigns the next key epoch, and acknowledges both in a `ServerHello`:
//!
//! ```text
//!  Node                                   Gateway
//!   │  ClientHello { X, IV_n, hmac }        │
//!   ├──────────────────────────────────────>│  verify hmac
//!   │                                       │  key = KDF(y·X ‖ IV_n ‖ IV_g)
//!   │  ServerHello { Y, IV_g, key_id, hmac }│  key_id = prev + 1
//!   │<──────────────────────────────────────┤
//!   │  verify hmac                          │
//!   │  key = KDF(x·Y ‖ IV_n ‖ IV_g)         │
//! ```
//!
//! After that every session-keyed frame is a ChaCha20-Poly1305 envelope
//! whose associated data binds `{type, src, dst, key_id, counter}` and
//! whose nonce binds `{key_id, direction, counter}`, so replayed,
//! redirected, or cross-typed frames all fail authentication.

use emberlink_crypto::{
    DhKeyPair, SymmetricKey, build_nonce, derive_session_key, handshake_tag, open, seal,
    verify_handshake_tag,
};
use emberlink_proto::{
    Direction, Envelope, Frame, InvalidateReason, Keying, MacAddress, MessageType,
};

use crate::{config::ProtocolConfig, counter::{CounterOutcome, ReplayWindow}, errors::SessionError};

/// Peer lifecycle states.
///
/// The node walks `Unregistered → InitPending → Registered`; the gateway
/// jumps straight to `Registered` on a valid `ClientHello`. `Sleepy` is
/// `Registered` for a peer that has declared the sleepy capability.
/// No state is terminal; peers are always re-admittable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// No session; data frames are rejected
    Unregistered,
    /// Handshake in flight (node side: `ClientHello` sent)
    InitPending,
    /// Session established
    Registered,
    /// Session established, peer deep-sleeps between transmissions
    Sleepy,
    /// Session exceeded its lifetime; must re-handshake
    KeyExpired,
}

impl PeerStatus {
    /// Whether a session key is usable in this state.
    #[must_use]
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Sleepy)
    }
}

/// Which end of the link this session lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sensor endpoint: sends upstream, receives downstream
    Node,
    /// Coordinator: sends downstream, receives upstream
    Gateway,
}

impl Role {
    fn send_direction(self) -> Direction {
        match self {
            Self::Node => Direction::Up,
            Self::Gateway => Direction::Down,
        }
    }

    fn recv_direction(self) -> Direction {
        match self {
            Self::Node => Direction::Down,
            Self::Gateway => Direction::Up,
        }
    }
}

/// A successfully opened envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Decrypted payload
    pub plaintext: Vec<u8>,
    /// Frames lost before this one, from the counter gap
    pub lost: u16,
}

/// An established session: key, epoch, and both counter streams.
///
/// The key is zeroized when the session is dropped or replaced.
pub struct Session {
    role: Role,
    key: SymmetricKey,
    key_id: u8,
    send_counter: u16,
    recv: ReplayWindow,
}

impl Session {
    fn new(role: Role, key: SymmetricKey, key_id: u8) -> Self {
        Self { role, key, key_id, send_counter: 1, recv: ReplayWindow::new() }
    }

    /// Key epoch acknowledged in the handshake that minted this session.
    #[must_use]
    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    /// The session key. Exposed for broadcast-key delivery, which is
    /// sealed per recipient under their session key.
    #[must_use]
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Next counter this side will send.
    #[must_use]
    pub fn next_send_counter(&self) -> u16 {
        self.send_counter
    }

    /// Last accepted receive counter.
    #[must_use]
    pub fn last_recv_counter(&self) -> u16 {
        self.recv.last_accepted()
    }

    /// Current run of consecutive counter rejects on the receive side.
    #[must_use]
    pub fn consecutive_rejects(&self) -> u8 {
        self.recv.consecutive_rejects()
    }

    /// Seal a payload into an envelope, consuming the next send counter.
    ///
    /// `nonce_prefix` is caller-provided randomness; uniqueness is
    /// guaranteed by the counter regardless.
    ///
    /// # Errors
    ///
    /// - `SessionError::WrongDirection` if `msg_type` is not a
    ///   session-keyed type this role sends
    pub fn seal(
        &mut self,
        nonce_prefix: [u8; 4],
        msg_type: MessageType,
        src: MacAddress,
        dst: MacAddress,
        plaintext: &[u8],
    ) -> Result<Envelope, SessionError> {
        if msg_type.keying() != Keying::Session
            || msg_type.direction() != self.role.send_direction()
        {
            return Err(SessionError::WrongDirection(msg_type));
        }

        let counter = self.send_counter;
        self.send_counter = self.send_counter.wrapping_add(1);

        Ok(seal_with_key(
            &self.key,
            self.key_id,
            counter,
            nonce_prefix,
            msg_type,
            src,
            dst,
            plaintext,
        ))
    }

    /// Open a received envelope: direction and epoch checks, decrypt,
    /// then counter acceptance.
    ///
    /// # Errors
    ///
    /// - `SessionError::WrongDirection` if this role does not receive
    ///   this type
    /// - `SessionError::StaleKeyEpoch` if the frame's epoch is not the
    ///   session's (drop silently; expected during crossed handshakes)
    /// - `SessionError::DecryptFailed` on AEAD failure
    /// - `SessionError::ReplayRejected` if the counter is outside the
    ///   acceptance window
    pub fn open(
        &mut self,
        envelope: &Envelope,
        src: MacAddress,
        dst: MacAddress,
        config: &ProtocolConfig,
    ) -> Result<Opened, SessionError> {
        if envelope.msg_type.keying() != Keying::Session
            || envelope.msg_type.direction() != self.role.recv_direction()
        {
            return Err(SessionError::WrongDirection(envelope.msg_type));
        }

        if envelope.key_id != self.key_id {
            return Err(SessionError::StaleKeyEpoch {
                expected: self.key_id,
                got: envelope.key_id,
            });
        }

        let plaintext = open_with_key(&self.key, envelope, src, dst)?;

        if !config.use_counter {
            return Ok(Opened { plaintext, lost: 0 });
        }

        match self.recv.offer(envelope.counter, config.counter_window) {
            CounterOutcome::Accepted { lost } => Ok(Opened { plaintext, lost }),
            CounterOutcome::Rejected { consecutive } => Err(SessionError::ReplayRejected {
                counter: envelope.counter,
                last: self.recv.last_accepted(),
                consecutive,
            }),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("key_id", &self.key_id)
            .field("send_counter", &self.send_counter)
            .finish_non_exhaustive()
    }
}

/// Associated data binding an envelope to its routing and epoch context.
#[must_use]
pub fn build_aad(
    msg_type: MessageType,
    src: MacAddress,
    dst: MacAddress,
    key_id: u8,
    counter: u16,
) -> [u8; 16] {
    let mut aad = [0u8; 16];
    aad[0] = msg_type.tag();
    aad[1..7].copy_from_slice(src.as_bytes());
    aad[7..13].copy_from_slice(dst.as_bytes());
    aad[13] = key_id;
    aad[14..16].copy_from_slice(&counter.to_le_bytes());
    aad
}

/// Seal an envelope under an explicit key. Used directly for
/// broadcast-keyed frames, where the epoch rides in the `key_id` slot and
/// counters are managed per broadcast scope.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn seal_with_key(
    key: &SymmetricKey,
    key_id: u8,
    counter: u16,
    nonce_prefix: [u8; 4],
    msg_type: MessageType,
    src: MacAddress,
    dst: MacAddress,
    plaintext: &[u8],
) -> Envelope {
    let nonce = build_nonce(nonce_prefix, key_id, msg_type.direction().byte(), counter);
    let aad = build_aad(msg_type, src, dst, key_id, counter);
    let ciphertext = seal(key, &nonce, &aad, plaintext);
    debug_assert!(msg_type.is_envelope());
    Envelope { msg_type, key_id, counter, nonce, ciphertext }
}

/// Open an envelope under an explicit key: decrypt and authenticate only.
/// Epoch and counter policy stay with the caller.
///
/// # Errors
///
/// - `SessionError::DecryptFailed` on AEAD failure
pub fn open_with_key(
    key: &SymmetricKey,
    envelope: &Envelope,
    src: MacAddress,
    dst: MacAddress,
) -> Result<Vec<u8>, SessionError> {
    let aad = build_aad(envelope.msg_type, src, dst, envelope.key_id, envelope.counter);
    open(key, &envelope.nonce, &aad, &envelope.ciphertext)
        .map_err(|_| SessionError::DecryptFailed)
}

/// Node-side pending handshake: ephemeral secret and IV held between
/// sending `ClientHello` and receiving `ServerHello`.
pub struct HandshakeInitiation {
    keypair: DhKeyPair,
    iv: [u8; 12],
}

impl HandshakeInitiation {
    /// Start a handshake: draw an ephemeral key pair and IV, produce the
    /// `ClientHello` to transmit.
    #[must_use]
    pub fn new<E: crate::env::Environment>(env: &E, network_key: &[u8; 32]) -> (Self, Frame) {
        let keypair = DhKeyPair::from_seed(env.random_array());
        let iv = env.random_array();
        let public_key = keypair.public_bytes();

        let hmac = handshake_tag(
            network_key,
            &[&[MessageType::ClientHello.tag()], &public_key, &iv],
        );
        let frame = Frame::ClientHello { public_key, iv, hmac };
        (Self { keypair, iv }, frame)
    }

    /// Complete against a received `ServerHello`, deriving the session.
    /// The initiation is not consumed, so a forged reply leaves the
    /// handshake intact for the genuine one.
    ///
    /// # Errors
    ///
    /// - `SessionError::HandshakeAuthentication` if the HMAC does not
    ///   verify under the network key
    /// - `SessionError::KeyExchange` if the peer's point is degenerate
    pub fn complete(
        &self,
        network_key: &[u8; 32],
        server_public: &[u8; 32],
        server_iv: &[u8; 12],
        key_id: u8,
        hmac: &[u8; 32],
    ) -> Result<Session, SessionError> {
        let authentic = verify_handshake_tag(
            network_key,
            &[&[MessageType::ServerHello.tag()], server_public, server_iv, &[key_id]],
            hmac,
        );
        if !authentic {
            return Err(SessionError::HandshakeAuthentication);
        }

        let shared = self.keypair.agree(server_public).map_err(SessionError::KeyExchange)?;
        let key = derive_session_key(&shared, &self.iv, server_iv);
        Ok(Session::new(Role::Node, key, key_id))
    }
}

/// Gateway-side handshake response: authenticate the `ClientHello`,
/// complete the exchange, and mint the session under `key_id`.
///
/// # Errors
///
/// - `SessionError::HandshakeAuthentication` if the client HMAC does not
///   verify under the network key
/// - `SessionError::KeyExchange` if the client's point is degenerate
pub fn respond_handshake<E: crate::env::Environment>(
    env: &E,
    network_key: &[u8; 32],
    client_public: &[u8; 32],
    client_iv: &[u8; 12],
    client_hmac: &[u8; 32],
    key_id: u8,
) -> Result<(Session, Frame), SessionError> {
    let authentic = verify_handshake_tag(
        network_key,
        &[&[MessageType::ClientHello.tag()], client_public, client_iv],
        client_hmac,
    );
    if !authentic {
        return Err(SessionError::HandshakeAuthentication);
    }

    let keypair = DhKeyPair::from_seed(env.random_array());
    let iv: [u8; 12] = env.random_array();
    let public_key = keypair.public_bytes();

    let shared = keypair.agree(client_public).map_err(SessionError::KeyExchange)?;
    let key = derive_session_key(&shared, client_iv, &iv);

    let hmac = handshake_tag(
        network_key,
        &[&[MessageType::ServerHello.tag()], &public_key, &iv, &[key_id]],
    );
    let frame = Frame::ServerHello { public_key, iv, key_id, hmac };
    Ok((Session::new(Role::Gateway, key, key_id), frame))
}

/// Build an invalidate-key frame, authenticated under the network key.
#[must_use]
pub fn invalidate_frame(network_key: &[u8; 32], reason: InvalidateReason) -> Frame {
    let hmac = handshake_tag(
        network_key,
        &[&[MessageType::InvalidateKey.tag()], &[reason.code()]],
    );
    Frame::InvalidateKey { reason, hmac }
}

/// Verify a received invalidate-key frame.
#[must_use]
pub fn verify_invalidate_frame(
    network_key: &[u8; 32],
    reason: InvalidateReason,
    hmac: &[u8; 32],
) -> bool {
    verify_handshake_tag(
        network_key,
        &[&[MessageType::InvalidateKey.tag()], &[reason.code()]],
        hmac,
    )
}
