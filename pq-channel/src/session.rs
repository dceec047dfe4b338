//! Secure session for encrypted communication
//!
//! [`SecureSession`] is pure state: it turns plaintext into sealed frames
//! and back, and never touches a socket. The connection layer decides when
//! bytes move.
//!
//! Every frame is AES-256-GCM sealed with a counter nonce. The additional
//! data is the session id followed by the frame header, so the length and
//! kind are authenticated along with the payload.

use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::cipher::{DirectionalCipher, TAG_LEN};
use crate::codec::{decode_stream, frame_header, Frame, FrameKind, HEADER_LEN};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::kdf;
use crate::transcript::TranscriptHash;
use crate::types::{Direction, Role, SessionKeys};

/// Length of the fresh key material carried by a REKEY frame
pub const REKEY_EXTENSION_LEN: usize = 32;

/// What an opened frame meant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Application payload
    Data(Vec<u8>),
    /// Peer rotated its send key; our receive key followed
    Rekeyed,
    /// Peer closed gracefully; nothing more will arrive
    Close,
}

/// Statistics about a secure session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Total bytes sent, headers included
    pub bytes_sent: u64,
    /// Total bytes received, headers included
    pub bytes_received: u64,
    /// Application messages sent
    pub messages_sent: u64,
    /// Application messages received
    pub messages_received: u64,
    /// Send-key rotations
    pub rekeys_sent: u64,
    /// Receive-key rotations
    pub rekeys_received: u64,
    /// Session duration in milliseconds
    pub duration_ms: u64,
}

/// An established session: directional keys, counters, and ciphers.
pub struct SecureSession {
    keys: SessionKeys,
    send: DirectionalCipher,
    recv: DirectionalCipher,
    max_frame_len: usize,
    rekey_after: u64,
    auto_rekey: bool,
    send_closed: bool,
    recv_closed: bool,
    poisoned: bool,
    stats: SessionStats,
    established_at: Instant,
}

impl SecureSession {
    /// Create a new secure session from handshake results
    pub fn new(keys: SessionKeys, config: &ChannelConfig) -> Result<Self> {
        let send = DirectionalCipher::new(&keys.send_key)?;
        let recv = DirectionalCipher::new(&keys.recv_key)?;
        Ok(Self {
            keys,
            send,
            recv,
            max_frame_len: config.max_frame_len,
            rekey_after: config.rekey_after,
            auto_rekey: config.auto_rekey,
            send_closed: false,
            recv_closed: false,
            poisoned: false,
            stats: SessionStats::default(),
            established_at: Instant::now(),
        })
    }

    pub fn role(&self) -> Role {
        self.keys.role
    }

    pub fn session_id(&self) -> &[u8; 32] {
        &self.keys.session_id
    }

    pub fn transcript_hash(&self) -> &TranscriptHash {
        &self.keys.transcript
    }

    /// Next nonce counter for sending
    pub fn send_nonce(&self) -> u64 {
        self.keys.send_nonce
    }

    /// Next expected nonce counter for receiving
    pub fn recv_nonce(&self) -> u64 {
        self.keys.recv_nonce
    }

    pub fn is_send_closed(&self) -> bool {
        self.send_closed || self.poisoned
    }

    pub fn is_recv_closed(&self) -> bool {
        self.recv_closed || self.poisoned
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            duration_ms: self.established_at.elapsed().as_millis() as u64,
            ..self.stats.clone()
        }
    }

    /// Seal `plaintext` as a DATA frame and return the on-wire bytes.
    ///
    /// The bytes may start with a REKEY frame when the send counter has
    /// reached its bound.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let frames = self.seal_frame(FrameKind::Data, plaintext)?;
        self.encode_all(&frames)
    }

    /// Seal the graceful close marker. No further frames can be sealed.
    pub fn seal_close(&mut self) -> Result<Vec<u8>> {
        let frames = self.seal_frame(FrameKind::Close, &[])?;
        self.encode_all(&frames)
    }

    /// Seal one DATA or CLOSE frame, preceded by a REKEY frame if the send
    /// key has to rotate first. Frames must be written in the order returned.
    pub fn seal_frame(&mut self, kind: FrameKind, plaintext: &[u8]) -> Result<Vec<Frame>> {
        if self.poisoned {
            return Err(ChannelError::TamperedFrame);
        }
        if self.send_closed {
            return Err(ChannelError::Closed);
        }
        if !matches!(kind, FrameKind::Data | FrameKind::Close) {
            return Err(ChannelError::protocol(format!(
                "cannot seal {:?} frames directly",
                kind
            )));
        }
        // size check before any state changes
        frame_header(kind, plaintext.len() + TAG_LEN, self.max_frame_len)?;

        let mut frames = Vec::with_capacity(1);
        if self.keys.send_nonce >= self.rekey_after.saturating_sub(1) {
            if self.auto_rekey {
                frames.push(self.rotate_send_key()?);
            } else if self.keys.send_nonce >= self.rekey_after {
                tracing::warn!(
                    role = %self.keys.role,
                    "send nonces exhausted with auto-rekey disabled, closing session"
                );
                self.send_closed = true;
                return Err(ChannelError::NonceExhausted);
            }
        }

        frames.push(self.seal_one(kind, plaintext)?);
        match kind {
            FrameKind::Data => self.stats.messages_sent += 1,
            FrameKind::Close => self.send_closed = true,
            _ => {}
        }
        Ok(frames)
    }

    /// Open exactly one on-wire frame.
    ///
    /// Anything that does not parse as a single well-formed frame is
    /// treated as tampering.
    pub fn open(&mut self, bytes: &[u8]) -> Result<Inbound> {
        if self.poisoned {
            return Err(ChannelError::TamperedFrame);
        }
        let mut iter = decode_stream(bytes, self.max_frame_len);
        let frame = match iter.next() {
            Some(Ok(frame)) if iter.remainder().is_empty() => frame,
            _ => return Err(self.poison(ChannelError::TamperedFrame)),
        };
        self.open_frame(&frame)
    }

    /// Open a frame already split off the stream by the codec.
    pub fn open_frame(&mut self, frame: &Frame) -> Result<Inbound> {
        if self.poisoned {
            return Err(ChannelError::TamperedFrame);
        }
        if self.recv_closed {
            return Err(ChannelError::Closed);
        }
        match self.open_inner(frame) {
            Ok(inbound) => Ok(inbound),
            Err(e) => Err(self.poison(e)),
        }
    }

    fn open_inner(&mut self, frame: &Frame) -> Result<Inbound> {
        if frame.kind == FrameKind::Handshake {
            return Err(ChannelError::protocol(
                "handshake frame on an established session",
            ));
        }
        if frame.payload.len() < TAG_LEN {
            return Err(ChannelError::TamperedFrame);
        }

        let header = frame_header(frame.kind, frame.payload.len(), self.max_frame_len)?;
        let aad = self.aad(&header);
        let counter = self.keys.recv_nonce;
        let mut plaintext = self.recv.open(counter, &aad, &frame.payload)?;
        self.keys.recv_nonce = counter
            .checked_add(1)
            .ok_or(ChannelError::NonceExhausted)?;
        self.stats.bytes_received += (HEADER_LEN + frame.payload.len()) as u64;

        match frame.kind {
            FrameKind::Data => {
                self.stats.messages_received += 1;
                Ok(Inbound::Data(plaintext))
            }
            FrameKind::Rekey => {
                if plaintext.len() != REKEY_EXTENSION_LEN {
                    plaintext.zeroize();
                    return Err(ChannelError::protocol("malformed rekey frame"));
                }
                let next = kdf::rekey(&self.keys, Direction::Recv, &plaintext);
                plaintext.zeroize();
                self.keys = next?;
                self.recv = DirectionalCipher::new(&self.keys.recv_key)?;
                self.stats.rekeys_received += 1;
                tracing::debug!(role = %self.keys.role, "receive key rotated");
                Ok(Inbound::Rekeyed)
            }
            FrameKind::Close => {
                self.recv_closed = true;
                Ok(Inbound::Close)
            }
            FrameKind::Handshake => Err(ChannelError::protocol("unexpected handshake frame")),
        }
    }

    fn seal_one(&mut self, kind: FrameKind, plaintext: &[u8]) -> Result<Frame> {
        let header = frame_header(kind, plaintext.len() + TAG_LEN, self.max_frame_len)?;
        let aad = self.aad(&header);
        let counter = self.keys.send_nonce;
        let ciphertext = self.send.seal(counter, &aad, plaintext)?;
        self.keys.send_nonce = counter
            .checked_add(1)
            .ok_or(ChannelError::NonceExhausted)?;
        self.stats.bytes_sent += (HEADER_LEN + ciphertext.len()) as u64;
        Ok(Frame::new(kind, ciphertext))
    }

    /// Announce fresh key material under the last nonce of the current key,
    /// then switch the send side to the derived key.
    fn rotate_send_key(&mut self) -> Result<Frame> {
        let mut extension = [0u8; REKEY_EXTENSION_LEN];
        OsRng.fill_bytes(&mut extension);

        let frame = match self.seal_one(FrameKind::Rekey, &extension) {
            Ok(frame) => frame,
            Err(e) => {
                extension.zeroize();
                return Err(e);
            }
        };
        let next = kdf::rekey(&self.keys, Direction::Send, &extension);
        extension.zeroize();

        self.keys = next?;
        self.send = DirectionalCipher::new(&self.keys.send_key)?;
        self.stats.rekeys_sent += 1;
        tracing::debug!(role = %self.keys.role, "send key rotated");
        Ok(frame)
    }

    fn aad(&self, header: &[u8; HEADER_LEN]) -> [u8; 32 + HEADER_LEN] {
        let mut aad = [0u8; 32 + HEADER_LEN];
        aad[..32].copy_from_slice(&self.keys.session_id);
        aad[32..].copy_from_slice(header);
        aad
    }

    fn encode_all(&self, frames: &[Frame]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for frame in frames {
            out.extend(frame.encode(self.max_frame_len)?);
        }
        Ok(out)
    }

    fn poison(&mut self, err: ChannelError) -> ChannelError {
        if err.is_fatal() {
            tracing::warn!(role = %self.keys.role, error = %err, "session poisoned");
            self.poisoned = true;
        }
        err
    }
}

impl std::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("keys", &self.keys)
            .field("send_closed", &self.send_closed)
            .field("recv_closed", &self.recv_closed)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kem::SharedSecret;
    use crate::codec::MAX_FRAME_LEN;
    use proptest::prelude::*;

    fn pair_with(config: &ChannelConfig) -> (SecureSession, SecureSession) {
        let secrets = || vec![SharedSecret::from_array([42u8; 32])];
        let transcript = [7u8; 32];
        let initiator = kdf::derive(secrets(), &transcript, Role::Initiator).unwrap();
        let responder = kdf::derive(secrets(), &transcript, Role::Responder).unwrap();
        (
            SecureSession::new(initiator, config).unwrap(),
            SecureSession::new(responder, config).unwrap(),
        )
    }

    fn pair() -> (SecureSession, SecureSession) {
        pair_with(&ChannelConfig::default())
    }

    /// Open every frame in `wire`, returning what each meant.
    fn open_all(session: &mut SecureSession, wire: &[u8]) -> Vec<Inbound> {
        let mut iter = decode_stream(wire, session.max_frame_len);
        let out = iter
            .by_ref()
            .map(|frame| session.open_frame(&frame.unwrap()).unwrap())
            .collect();
        assert!(iter.remainder().is_empty());
        out
    }

    #[test]
    fn test_ping() {
        let (mut initiator, mut responder) = pair();

        let sealed = initiator.seal(b"ping").unwrap();
        assert_eq!(responder.open(&sealed).unwrap(), Inbound::Data(b"ping".to_vec()));

        let sealed = responder.seal(b"pong").unwrap();
        assert_eq!(initiator.open(&sealed).unwrap(), Inbound::Data(b"pong".to_vec()));

        assert_eq!(initiator.send_nonce(), 1);
        assert_eq!(initiator.recv_nonce(), 1);
    }

    #[test]
    fn test_reflection_and_replay_rejected() {
        let (mut initiator, mut responder) = pair();
        let sealed = initiator.seal(b"hello").unwrap();

        // our own frame does not open with our receive key
        assert!(matches!(initiator.open(&sealed), Err(ChannelError::TamperedFrame)));

        responder.open(&sealed).unwrap();
        assert!(matches!(responder.open(&sealed), Err(ChannelError::TamperedFrame)));
    }

    #[test]
    fn test_poisoned_session_stays_failed() {
        let (mut initiator, mut responder) = pair();
        let first = initiator.seal(b"one").unwrap();
        let second = initiator.seal(b"two").unwrap();

        let mut bad = first.clone();
        let last = bad.len() - 1;
        bad[last] ^= 1;
        assert!(matches!(responder.open(&bad), Err(ChannelError::TamperedFrame)));
        assert!(matches!(responder.open(&second), Err(ChannelError::TamperedFrame)));
        assert!(responder.is_recv_closed());
        assert!(matches!(responder.seal(b"x"), Err(ChannelError::TamperedFrame)));
    }

    #[test]
    fn test_automatic_rekey_at_low_bound() {
        let config = ChannelConfig::default().with_rekey_after(3);
        let (mut initiator, mut responder) = pair_with(&config);

        let mut received = Vec::new();
        let mut rekeys = 0;
        for i in 0..10u8 {
            let wire = initiator.seal(&[i; 5]).unwrap();
            assert!(initiator.send_nonce() < 3);
            for inbound in open_all(&mut responder, &wire) {
                match inbound {
                    Inbound::Data(data) => received.push(data),
                    Inbound::Rekeyed => rekeys += 1,
                    Inbound::Close => panic!("unexpected close"),
                }
            }
        }

        let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 5]).collect();
        assert_eq!(received, expected);
        assert!(rekeys >= 4);
        assert_eq!(initiator.stats().rekeys_sent, rekeys);
        assert_eq!(responder.stats().rekeys_received, rekeys);
        assert_eq!(responder.stats().messages_received, 10);

        // the other direction is untouched
        let wire = responder.seal(b"back").unwrap();
        assert_eq!(initiator.open(&wire).unwrap(), Inbound::Data(b"back".to_vec()));
    }

    #[test]
    fn test_exhaustion_without_rekey_closes() {
        let config = ChannelConfig::default()
            .with_rekey_after(2)
            .with_auto_rekey(false);
        let (mut initiator, _) = pair_with(&config);

        initiator.seal(b"a").unwrap();
        initiator.seal(b"b").unwrap();
        assert!(matches!(initiator.seal(b"c"), Err(ChannelError::NonceExhausted)));
        assert!(matches!(initiator.seal(b"d"), Err(ChannelError::Closed)));
        assert_eq!(initiator.send_nonce(), 2);
    }

    #[test]
    fn test_graceful_close() {
        let (mut initiator, mut responder) = pair();
        let wire = initiator.seal_close().unwrap();
        assert!(initiator.is_send_closed());
        assert!(matches!(initiator.seal(b"late"), Err(ChannelError::Closed)));

        assert_eq!(responder.open(&wire).unwrap(), Inbound::Close);
        assert!(responder.is_recv_closed());
        // the peer can still send its own close
        let wire = responder.seal_close().unwrap();
        assert_eq!(initiator.open(&wire).unwrap(), Inbound::Close);
    }

    #[test]
    fn test_oversized_plaintext_leaves_state_alone() {
        let config = ChannelConfig::default().with_max_frame_len(64);
        let (mut initiator, mut responder) = pair_with(&config);

        assert!(matches!(
            initiator.seal(&[0u8; 64]),
            Err(ChannelError::FrameTooLarge { .. })
        ));
        assert_eq!(initiator.send_nonce(), 0);

        let wire = initiator.seal(b"fits").unwrap();
        assert_eq!(responder.open(&wire).unwrap(), Inbound::Data(b"fits".to_vec()));
    }

    #[test]
    fn test_largest_payload_fits_exactly() {
        for max_frame_len in [4096, MAX_FRAME_LEN] {
            let config = ChannelConfig::default().with_max_frame_len(max_frame_len);
            let (mut initiator, mut responder) = pair_with(&config);
            let largest = max_frame_len - 1 - TAG_LEN;

            let payload = vec![0xA5u8; largest];
            let wire = initiator.seal(&payload).unwrap();
            assert_eq!(wire.len(), HEADER_LEN + largest + TAG_LEN);
            assert_eq!(responder.open(&wire).unwrap(), Inbound::Data(payload));

            assert!(matches!(
                initiator.seal(&vec![0u8; largest + 1]),
                Err(ChannelError::FrameTooLarge { declared, max })
                    if declared == max_frame_len + 1 && max == max_frame_len
            ));
            // the rejected payload consumed no nonce
            let wire = initiator.seal(b"next").unwrap();
            assert_eq!(responder.open(&wire).unwrap(), Inbound::Data(b"next".to_vec()));
        }
    }

    proptest! {
        // payloads up to a full frame are slow to generate
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn sealed_payloads_round_trip(
            payload in proptest::collection::vec(any::<u8>(), 0..MAX_FRAME_LEN - 1 - TAG_LEN),
        ) {
            let (mut initiator, mut responder) = pair();
            let wire = initiator.seal(&payload).unwrap();
            prop_assert_eq!(responder.open(&wire).unwrap(), Inbound::Data(payload));
        }
    }

    proptest! {
        #[test]
        fn any_bit_flip_is_tampering(
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            bit in any::<prop::sample::Index>(),
        ) {
            let (mut initiator, mut responder) = pair();
            let mut wire = initiator.seal(&payload).unwrap();
            let bit = bit.index(wire.len() * 8);
            wire[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(matches!(responder.open(&wire), Err(ChannelError::TamperedFrame)));
        }
    }
}
