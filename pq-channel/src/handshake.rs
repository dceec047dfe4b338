//! KEM handshake state machine
//!
//! The machine consumes and produces handshake message payloads; it never
//! touches a socket. Each inbound payload is decoded, checked against the
//! current phase, and only then handed to the KEM.
//!
//! ```text
//! single stage                        hybrid (two stages)
//!
//! I ── Hello(pk0) ─────────▶ R        I ── Hello(pk0) ─────────────▶ R
//! I ◀── KemReply(ct0) ────── R        I ◀── KemReply(ct0, pk1) ───── R
//! I ◀── Confirm(tagR) ────── R        I ── KemFinish(ct1) ──────────▶ R
//! I ── Confirm(tagI) ──────▶ R        I ── Confirm(tagI) ───────────▶ R
//!                                     I ◀── Confirm(tagR) ─────────── R
//! ```
//!
//! Keys are derived from the transcript over Hello, KemReply and KemFinish.
//! Both confirmations are then absorbed in role order so both peers end
//! with the same transcript hash.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use kem::{Kem, KemError, KemKeyPair, KemRegistry, KemVariant, SharedSecret};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::kdf;
use crate::session::SecureSession;
use crate::transcript::{Transcript, TranscriptHash};
use crate::types::{
    ConfirmMessage, HandshakeMessage, HelloMessage, KemFinishMessage, KemReplyMessage, Role,
    SessionKeys, PROTOCOL_VERSION,
};

/// Handshake phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Initiator has not sent Hello yet
    Init,
    /// Initiator waits for KemReply
    SentHello,
    /// Responder waits for Hello
    AwaitHello,
    /// Responder waits for the initiator's stage-1 ciphertext
    AwaitKemFinish,
    /// Keys derived; waiting for the peer's confirmation
    AwaitConfirm,
    Established,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Established | Phase::Failed)
    }
}

/// Handshake state machine
pub struct Handshake {
    role: Role,
    phase: Phase,
    config: ChannelConfig,
    registry: Arc<KemRegistry>,
    transcript: Transcript,
    variant: Option<KemVariant>,
    /// Key pair for the stage this side decapsulates
    local_keypair: Option<KemKeyPair>,
    peer_public_key: Option<Vec<u8>>,
    /// Shared secrets in stage order
    secrets: Vec<SharedSecret>,
    keys: Option<SessionKeys>,
    /// Our encoded Confirm, absorbed once the peer's arrives
    sent_confirm: Option<Vec<u8>>,
    final_transcript: Option<TranscriptHash>,
    deadline: Instant,
}

impl Handshake {
    /// Create the initiating side; call [`Handshake::start`] next
    pub fn initiator(config: ChannelConfig, registry: Arc<KemRegistry>, now: Instant) -> Self {
        Self::new(Role::Initiator, Phase::Init, config, registry, now)
    }

    /// Create the responding side, waiting for Hello
    pub fn responder(config: ChannelConfig, registry: Arc<KemRegistry>, now: Instant) -> Self {
        Self::new(Role::Responder, Phase::AwaitHello, config, registry, now)
    }

    fn new(
        role: Role,
        phase: Phase,
        config: ChannelConfig,
        registry: Arc<KemRegistry>,
        now: Instant,
    ) -> Self {
        let deadline = now + config.handshake_timeout;
        Self {
            role,
            phase,
            config,
            registry,
            transcript: Transcript::new(),
            variant: None,
            local_keypair: None,
            peer_public_key: None,
            secrets: Vec::new(),
            keys: None,
            sent_confirm: None,
            final_transcript: None,
            deadline,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Negotiated variant, once known
    pub fn variant(&self) -> Option<KemVariant> {
        self.variant
    }

    pub fn peer_public_key(&self) -> Option<&[u8]> {
        self.peer_public_key.as_deref()
    }

    pub fn is_established(&self) -> bool {
        self.phase == Phase::Established
    }

    /// Deadline for the current phase
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Transcript hash over the whole handshake, both confirmations included
    pub fn transcript_hash(&self) -> Option<TranscriptHash> {
        self.final_transcript
    }

    /// Fail the handshake if the current phase has run out of time
    pub fn check_timeout(&mut self, now: Instant) -> Result<()> {
        if !self.phase.is_terminal() && now >= self.deadline {
            tracing::warn!(role = %self.role, phase = ?self.phase, "handshake phase timed out");
            return Err(self.fail(ChannelError::HandshakeTimeout));
        }
        Ok(())
    }

    /// Produce the initiator's Hello for the configured variant
    pub fn start(&mut self, now: Instant) -> Result<Vec<u8>> {
        if self.role != Role::Initiator || self.phase != Phase::Init {
            return Err(self.fail(ChannelError::protocol("handshake already started")));
        }
        match self.start_inner(now) {
            Ok(hello) => Ok(hello),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Process one inbound handshake payload, returning the payloads to send
    /// in order (possibly none)
    pub fn handle(&mut self, payload: &[u8], now: Instant) -> Result<Vec<Vec<u8>>> {
        self.check_timeout(now)?;
        match self.handle_inner(payload, now) {
            Ok(out) => Ok(out),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Take the session keys of an established handshake
    pub fn into_keys(mut self) -> Result<SessionKeys> {
        if self.phase != Phase::Established {
            return Err(ChannelError::protocol("handshake not established"));
        }
        self.keys
            .take()
            .ok_or_else(|| ChannelError::protocol("session keys already taken"))
    }

    /// Turn an established handshake into a transport session
    pub fn into_session(self) -> Result<SecureSession> {
        let config = self.config.clone();
        let keys = self.into_keys()?;
        SecureSession::new(keys, &config)
    }

    fn start_inner(&mut self, now: Instant) -> Result<Vec<u8>> {
        let variant = self.config.offered_variant;
        if !self.registry.supports(variant) {
            return Err(ChannelError::UnsupportedAlgorithm(variant.id()));
        }
        let stage0 = self.stage_kem(variant, 0)?;
        let keypair = self.generate_keypair(stage0.as_ref())?;

        let hello = HandshakeMessage::Hello(HelloMessage {
            version: PROTOCOL_VERSION,
            variant: variant.id(),
            public_key: keypair.public_key().to_vec(),
        });
        let bytes = self.emit(&hello)?;

        self.variant = Some(variant);
        self.local_keypair = Some(keypair);
        self.enter(Phase::SentHello, now);

        if self.config.verbose_logging {
            tracing::debug!(variant = %variant, "Generated Hello message");
        }
        Ok(bytes)
    }

    fn handle_inner(&mut self, payload: &[u8], now: Instant) -> Result<Vec<Vec<u8>>> {
        let message = HandshakeMessage::decode(payload, self.config.max_frame_len)?;

        // phase gate: nothing below runs for an unexpected message
        match (self.phase, &message) {
            (Phase::AwaitHello, HandshakeMessage::Hello(_))
            | (Phase::SentHello, HandshakeMessage::KemReply(_))
            | (Phase::AwaitKemFinish, HandshakeMessage::KemFinish(_))
            | (Phase::AwaitConfirm, HandshakeMessage::Confirm(_)) => {}
            (phase, message) => {
                return Err(ChannelError::protocol(format!(
                    "unexpected {} in phase {:?}",
                    message.message_type(),
                    phase
                )));
            }
        }

        if self.config.verbose_logging {
            tracing::debug!(
                role = %self.role,
                message = message.message_type(),
                len = payload.len(),
                "Processing handshake message"
            );
        }

        match message {
            HandshakeMessage::Hello(hello) => self.on_hello(hello, payload, now),
            HandshakeMessage::KemReply(reply) => self.on_kem_reply(reply, payload, now),
            HandshakeMessage::KemFinish(finish) => self.on_kem_finish(finish, payload),
            HandshakeMessage::Confirm(confirm) => self.on_confirm(confirm, payload),
        }
    }

    /// Responder: encapsulate to the initiator's stage-0 key
    fn on_hello(&mut self, hello: HelloMessage, raw: &[u8], now: Instant) -> Result<Vec<Vec<u8>>> {
        if hello.version != PROTOCOL_VERSION {
            return Err(ChannelError::protocol(format!(
                "version mismatch: local {}, remote {}",
                PROTOCOL_VERSION, hello.version
            )));
        }
        let variant = KemVariant::from_id(hello.variant)
            .map_err(|_| ChannelError::UnsupportedAlgorithm(hello.variant))?;
        if !self.config.accepts(variant) || !self.registry.supports(variant) {
            return Err(ChannelError::UnsupportedAlgorithm(hello.variant));
        }
        self.variant = Some(variant);
        self.transcript.absorb(raw);

        let stage0 = self.stage_kem(variant, 0)?;
        let (ciphertext, secret) = stage0.encapsulate(&hello.public_key)?;
        self.secrets.push(secret);
        self.peer_public_key = Some(hello.public_key);

        if variant.is_hybrid() {
            let stage1 = self.stage_kem(variant, 1)?;
            let keypair = self.generate_keypair(stage1.as_ref())?;
            let reply = HandshakeMessage::KemReply(KemReplyMessage {
                ciphertext: ciphertext.into_bytes(),
                public_key: keypair.public_key().to_vec(),
            });
            let reply = self.emit(&reply)?;
            self.local_keypair = Some(keypair);
            self.enter(Phase::AwaitKemFinish, now);
            Ok(vec![reply])
        } else {
            let reply = HandshakeMessage::KemReply(KemReplyMessage {
                ciphertext: ciphertext.into_bytes(),
                public_key: Vec::new(),
            });
            let reply = self.emit(&reply)?;
            let confirm = self.derive_and_confirm()?;
            self.enter(Phase::AwaitConfirm, now);
            Ok(vec![reply, confirm])
        }
    }

    /// Initiator: recover stage 0, and for hybrids encapsulate stage 1
    fn on_kem_reply(
        &mut self,
        reply: KemReplyMessage,
        raw: &[u8],
        now: Instant,
    ) -> Result<Vec<Vec<u8>>> {
        let variant = self.negotiated()?;
        if variant.is_hybrid() == reply.public_key.is_empty() {
            return Err(ChannelError::protocol(
                "KemReply public key does not match the negotiated variant",
            ));
        }
        self.transcript.absorb(raw);

        let stage0 = self.stage_kem(variant, 0)?;
        let keypair = self
            .local_keypair
            .take()
            .ok_or_else(|| ChannelError::protocol("missing stage-0 key pair"))?;
        self.secrets.push(stage0.decapsulate(&reply.ciphertext, &keypair));
        drop(keypair);

        let mut out = Vec::with_capacity(2);
        if variant.is_hybrid() {
            let stage1 = self.stage_kem(variant, 1)?;
            let (ciphertext, secret) = stage1.encapsulate(&reply.public_key)?;
            self.secrets.push(secret);
            let finish = HandshakeMessage::KemFinish(KemFinishMessage {
                ciphertext: ciphertext.into_bytes(),
            });
            out.push(self.emit(&finish)?);
        }
        self.peer_public_key = Some(reply.public_key);

        out.push(self.derive_and_confirm()?);
        self.enter(Phase::AwaitConfirm, now);
        Ok(out)
    }

    /// Responder: recover stage 1 of a hybrid exchange
    fn on_kem_finish(&mut self, finish: KemFinishMessage, raw: &[u8]) -> Result<Vec<Vec<u8>>> {
        let variant = self.negotiated()?;
        self.transcript.absorb(raw);

        let stage1 = self.stage_kem(variant, 1)?;
        let keypair = self
            .local_keypair
            .take()
            .ok_or_else(|| ChannelError::protocol("missing stage-1 key pair"))?;
        self.secrets.push(stage1.decapsulate(&finish.ciphertext, &keypair));
        drop(keypair);

        let confirm = self.derive_and_confirm()?;
        // the initiator's Confirm follows KemFinish immediately; keep the
        // phase deadline running
        self.phase = Phase::AwaitConfirm;
        Ok(vec![confirm])
    }

    fn on_confirm(&mut self, confirm: ConfirmMessage, raw: &[u8]) -> Result<Vec<Vec<u8>>> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| ChannelError::protocol("confirmation before key derivation"))?;
        kdf::verify_confirmation(keys, self.role.peer(), &confirm.tag)?;

        let ours = self
            .sent_confirm
            .take()
            .ok_or_else(|| ChannelError::protocol("local confirmation missing"))?;
        match self.role {
            Role::Initiator => {
                self.transcript.absorb(&ours);
                self.transcript.absorb(raw);
            }
            Role::Responder => {
                self.transcript.absorb(raw);
                self.transcript.absorb(&ours);
            }
        }
        let final_hash = self.transcript.hash();
        self.final_transcript = Some(final_hash);
        self.phase = Phase::Established;

        tracing::info!(
            role = %self.role,
            variant = ?self.variant,
            transcript = %hex::encode(final_hash),
            "Handshake established"
        );
        Ok(Vec::new())
    }

    /// Derive keys over the transcript so far and produce our Confirm
    fn derive_and_confirm(&mut self) -> Result<Vec<u8>> {
        let secrets = std::mem::take(&mut self.secrets);
        let keys = kdf::derive(secrets, &self.transcript.hash(), self.role)?;
        let tag = kdf::confirmation_tag(&keys, self.role)?;
        let confirm = HandshakeMessage::Confirm(ConfirmMessage { tag })
            .encode(self.config.max_frame_len)?;

        if self.config.verbose_logging {
            tracing::debug!(
                role = %self.role,
                session_id = %hex::encode(keys.session_id),
                "Derived session keys"
            );
        }
        self.keys = Some(keys);
        self.sent_confirm = Some(confirm.clone());
        Ok(confirm)
    }

    /// Encode an outbound KEM message and absorb it
    fn emit(&mut self, message: &HandshakeMessage) -> Result<Vec<u8>> {
        let bytes = message.encode(self.config.max_frame_len)?;
        self.transcript.absorb(&bytes);
        Ok(bytes)
    }

    fn generate_keypair(&self, kem: &dyn Kem) -> Result<KemKeyPair> {
        let mut keypair = kem.generate_keypair()?;
        if let Some(hook) = &self.config.wipe_hook {
            keypair.set_wipe_hook(hook.clone());
        }
        Ok(keypair)
    }

    fn stage_kem(&self, variant: KemVariant, stage: usize) -> Result<Arc<dyn Kem>> {
        let algorithm = variant
            .stages()
            .get(stage)
            .copied()
            .ok_or(ChannelError::Kem(KemError::UnknownVariant(variant.id())))?;
        Ok(self.registry.get(algorithm)?)
    }

    fn negotiated(&self) -> Result<KemVariant> {
        self.variant
            .ok_or_else(|| ChannelError::protocol("no variant negotiated"))
    }

    fn enter(&mut self, phase: Phase, now: Instant) {
        self.phase = phase;
        self.deadline = now + self.config.handshake_timeout;
    }

    /// Move to Failed and drop every secret still held
    fn fail(&mut self, err: ChannelError) -> ChannelError {
        if self.phase != Phase::Failed {
            tracing::warn!(
                role = %self.role,
                phase = ?self.phase,
                error = %err,
                "Handshake failed"
            );
        }
        self.phase = Phase::Failed;
        self.local_keypair = None;
        self.secrets.clear();
        self.keys = None;
        self.sent_confirm = None;
        err
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Inbound;
    use std::sync::Mutex;
    use std::time::Duration;

    fn registry() -> Arc<KemRegistry> {
        Arc::new(KemRegistry::builtin())
    }

    /// Run both machines to completion by passing payloads back and forth.
    fn run(
        variant: KemVariant,
        initiator_config: ChannelConfig,
        responder_config: ChannelConfig,
    ) -> (Handshake, Handshake, usize) {
        let now = Instant::now();
        let mut initiator =
            Handshake::initiator(initiator_config.with_variant(variant), registry(), now);
        let mut responder = Handshake::responder(responder_config, registry(), now);

        let mut to_responder = vec![initiator.start(now).unwrap()];
        let mut to_initiator: Vec<Vec<u8>> = Vec::new();
        let mut messages = 1;
        while !(initiator.is_established() && responder.is_established()) {
            for payload in std::mem::take(&mut to_responder) {
                let out = responder.handle(&payload, now).unwrap();
                messages += out.len();
                to_initiator.extend(out);
            }
            for payload in std::mem::take(&mut to_initiator) {
                let out = initiator.handle(&payload, now).unwrap();
                messages += out.len();
                to_responder.extend(out);
            }
        }
        (initiator, responder, messages)
    }

    fn assert_mirrored(initiator: Handshake, responder: Handshake) {
        assert_eq!(initiator.transcript_hash(), responder.transcript_hash());
        assert!(initiator.transcript_hash().is_some());
        let i = initiator.into_keys().unwrap();
        let r = responder.into_keys().unwrap();
        assert_eq!(i.send_key, r.recv_key);
        assert_eq!(i.recv_key, r.send_key);
        assert_eq!(i.session_id, r.session_id);
    }

    #[test]
    fn test_single_stage_variants_establish() {
        for variant in [KemVariant::MlKem768, KemVariant::NtruHps2048509] {
            let (i, r, messages) =
                run(variant, ChannelConfig::default(), ChannelConfig::default());
            assert_eq!(messages, 4);
            assert_eq!(i.variant(), Some(variant));
            assert_mirrored(i, r);
        }
    }

    #[test]
    fn test_hybrid_establishes_with_extra_message() {
        let (i, r, messages) = run(
            KemVariant::HybridMlKemNtru,
            ChannelConfig::default(),
            ChannelConfig::default(),
        );
        assert_eq!(messages, 5);
        assert_mirrored(i, r);
    }

    #[test]
    fn test_mceliece_variants_establish() {
        // Classic McEliece key generation needs a large stack
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                for variant in [KemVariant::McEliece348864, KemVariant::HybridMlKemMcEliece] {
                    let (i, r, _) =
                        run(variant, ChannelConfig::default(), ChannelConfig::default());
                    assert_mirrored(i, r);
                }
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn test_ping_after_handshake() {
        let (i, r, _) = run(
            KemVariant::MlKem768,
            ChannelConfig::default(),
            ChannelConfig::default(),
        );
        let mut initiator = i.into_session().unwrap();
        let mut responder = r.into_session().unwrap();

        let sealed = initiator.seal(b"ping").unwrap();
        assert_eq!(responder.open(&sealed).unwrap(), Inbound::Data(b"ping".to_vec()));
    }

    #[test]
    fn test_confirm_before_kem_exchange_is_violation() {
        let now = Instant::now();
        let mut responder = Handshake::responder(ChannelConfig::default(), registry(), now);
        let confirm = HandshakeMessage::Confirm(ConfirmMessage { tag: [0; 32] })
            .encode(1024)
            .unwrap();

        assert!(matches!(
            responder.handle(&confirm, now),
            Err(ChannelError::ProtocolViolation(_))
        ));
        assert_eq!(responder.phase(), Phase::Failed);

        // no retry from Failed
        assert!(responder.handle(&confirm, now).is_err());
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let now = Instant::now();
        let mut responder = Handshake::responder(ChannelConfig::default(), registry(), now);
        let hello = HandshakeMessage::Hello(HelloMessage {
            version: PROTOCOL_VERSION,
            variant: 0x7f,
            public_key: vec![0; 32],
        })
        .encode(4096)
        .unwrap();

        assert!(matches!(
            responder.handle(&hello, now),
            Err(ChannelError::UnsupportedAlgorithm(0x7f))
        ));
        assert_eq!(responder.phase(), Phase::Failed);
    }

    #[test]
    fn test_variant_outside_accepted_set_rejected() {
        let now = Instant::now();
        let config = ChannelConfig::default().with_accepted_variants(vec![KemVariant::MlKem768]);
        let mut responder = Handshake::responder(config, registry(), now);
        let mut initiator = Handshake::initiator(
            ChannelConfig::default().with_variant(KemVariant::NtruHps2048509),
            registry(),
            now,
        );
        let hello = initiator.start(now).unwrap();
        assert!(matches!(
            responder.handle(&hello, now),
            Err(ChannelError::UnsupportedAlgorithm(0x03))
        ));
    }

    #[test]
    fn test_version_mismatch_is_violation() {
        let now = Instant::now();
        let mut responder = Handshake::responder(ChannelConfig::default(), registry(), now);
        let hello = HandshakeMessage::Hello(HelloMessage {
            version: PROTOCOL_VERSION + 1,
            variant: KemVariant::MlKem768.id(),
            public_key: vec![0; 1184],
        })
        .encode(4096)
        .unwrap();
        assert!(matches!(
            responder.handle(&hello, now),
            Err(ChannelError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_is_transcript_mismatch() {
        let now = Instant::now();
        let mut initiator = Handshake::initiator(ChannelConfig::default(), registry(), now);
        let mut responder = Handshake::responder(ChannelConfig::default(), registry(), now);

        let hello = initiator.start(now).unwrap();
        let out = responder.handle(&hello, now).unwrap();
        let (mut reply, responder_confirm) = (out[0].clone(), out[1].clone());

        // flip a bit inside the ciphertext (after the enum tag and length
        // prefix); decapsulation still yields a secret
        reply[20] ^= 0x01;
        let initiator_confirm = initiator.handle(&reply, now).unwrap();
        assert_eq!(initiator_confirm.len(), 1);

        assert!(matches!(
            initiator.handle(&responder_confirm, now),
            Err(ChannelError::TranscriptMismatch)
        ));
        assert_eq!(initiator.phase(), Phase::Failed);

        assert!(matches!(
            responder.handle(&initiator_confirm[0], now),
            Err(ChannelError::TranscriptMismatch)
        ));
    }

    #[test]
    fn test_phase_timeout() {
        let now = Instant::now();
        let config = ChannelConfig::default().with_timeout(Duration::from_millis(50));
        let mut initiator = Handshake::initiator(config, registry(), now);
        initiator.start(now).unwrap();

        initiator.check_timeout(now + Duration::from_millis(10)).unwrap();
        assert!(matches!(
            initiator.check_timeout(now + Duration::from_millis(60)),
            Err(ChannelError::HandshakeTimeout)
        ));
        assert_eq!(initiator.phase(), Phase::Failed);
    }

    #[test]
    fn test_keypairs_wiped() {
        let wiped = Arc::new(Mutex::new(Vec::new()));
        let sink = wiped.clone();
        let hook: kem::WipeHook = Arc::new(move |algorithm: kem::KemAlgorithm, bytes: &[u8]| {
            sink.lock()
                .unwrap()
                .push((algorithm, bytes.iter().all(|b| *b == 0)));
        });

        let config = ChannelConfig::default().with_wipe_hook(hook);
        let (i, r, _) = run(KemVariant::HybridMlKemNtru, config.clone(), config);

        let wiped = wiped.lock().unwrap().clone();
        assert_eq!(wiped.len(), 2);
        assert!(wiped.iter().all(|(_, zeroed)| *zeroed));
        assert!(i.local_keypair.is_none());
        assert!(r.local_keypair.is_none());
    }

    #[test]
    fn test_failure_wipes_live_keypair() {
        let wiped = Arc::new(Mutex::new(0usize));
        let sink = wiped.clone();
        let hook: kem::WipeHook =
            Arc::new(move |_: kem::KemAlgorithm, _: &[u8]| *sink.lock().unwrap() += 1);

        let now = Instant::now();
        let mut initiator =
            Handshake::initiator(ChannelConfig::default().with_wipe_hook(hook), registry(), now);
        initiator.start(now).unwrap();
        assert_eq!(*wiped.lock().unwrap(), 0);

        assert!(initiator.handle(b"garbage", now).is_err());
        assert_eq!(*wiped.lock().unwrap(), 1);
    }
}
