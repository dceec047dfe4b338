use std::sync::Arc;
use std::time::Instant;

use kem::{KemRegistry, KemVariant};
use proptest::prelude::*;

use pq_channel::codec::decode_stream;
use pq_channel::{ChannelConfig, ChannelError, Handshake, Inbound, Phase, MAX_FRAME_LEN};

fn handshake_pair(variant: KemVariant) -> (Handshake, Handshake) {
    let registry = Arc::new(KemRegistry::builtin());
    let now = Instant::now();
    (
        Handshake::initiator(
            ChannelConfig::default().with_variant(variant),
            registry.clone(),
            now,
        ),
        // McEliece stays out: its key generation needs more stack than a
        // test thread has
        Handshake::responder(
            ChannelConfig::default().with_accepted_variants([
                KemVariant::MlKem768,
                KemVariant::NtruHps2048509,
                KemVariant::HybridMlKemNtru,
            ]),
            registry,
            now,
        ),
    )
}

/// Run a handshake, flipping one byte of the `target`-th message on the wire.
///
/// Returns the first error either side hit.
fn run_with_flip(
    variant: KemVariant,
    target: usize,
    offset: usize,
    mask: u8,
) -> Result<(), ChannelError> {
    let (mut initiator, mut responder) = handshake_pair(variant);
    let now = Instant::now();
    let mut sent = 0usize;
    let mut tamper = |mut msg: Vec<u8>| {
        if sent == target {
            let i = offset % msg.len();
            msg[i] ^= mask;
        }
        sent += 1;
        msg
    };

    let mut to_responder = vec![tamper(initiator.start(now)?)];
    let mut to_initiator = Vec::new();
    for _ in 0..4 {
        for msg in std::mem::take(&mut to_responder) {
            for out in responder.handle(&msg, now)? {
                to_initiator.push(tamper(out));
            }
        }
        for msg in std::mem::take(&mut to_initiator) {
            for out in initiator.handle(&msg, now)? {
                to_responder.push(tamper(out));
            }
        }
        if initiator.is_established() && responder.is_established() {
            return Ok(());
        }
    }
    Err(ChannelError::protocol("handshake did not finish"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tampered_handshake_never_establishes(
        hybrid in any::<bool>(),
        target in 0usize..5,
        offset in any::<usize>(),
        mask in 1u8..=255,
    ) {
        // four messages single-stage, five hybrid
        let (variant, messages) = if hybrid {
            (KemVariant::HybridMlKemNtru, 5)
        } else {
            (KemVariant::MlKem768, 4)
        };
        let result = run_with_flip(variant, target % messages, offset, mask);
        match result {
            Ok(()) => prop_assert!(false, "tampering must fail"),
            Err(err) => prop_assert!(matches!(
                err,
                ChannelError::TranscriptMismatch
                    | ChannelError::ProtocolViolation(_)
                    | ChannelError::UnsupportedAlgorithm(_)
                    | ChannelError::Kem(_)
            ), "unexpected error {:?}", err),
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic_the_responder(
        bytes in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let (_, mut responder) = handshake_pair(KemVariant::MlKem768);
        if responder.handle(&bytes, Instant::now()).is_err() {
            prop_assert_eq!(responder.phase(), Phase::Failed);
        }
    }
}

#[test]
fn untampered_handshake_establishes() {
    // the tamper harness itself must not be what breaks the handshake
    run_with_flip(KemVariant::MlKem768, usize::MAX, 0, 0xff).unwrap();
    run_with_flip(KemVariant::HybridMlKemNtru, usize::MAX, 0, 0xff).unwrap();
}

#[test]
fn ciphertext_tampering_is_detected() {
    let (mut initiator, mut responder) = handshake_pair(KemVariant::MlKem768);
    let now = Instant::now();
    let hello = initiator.start(now).unwrap();
    let replies = responder.handle(&hello, now).unwrap();
    let mut confirms = Vec::new();
    for reply in replies {
        confirms.extend(initiator.handle(&reply, now).unwrap());
    }
    for confirm in confirms {
        responder.handle(&confirm, now).unwrap();
    }

    let mut channel_a = initiator.into_session().unwrap();
    let mut channel_b = responder.into_session().unwrap();
    let mut ciphertext = channel_a.seal(b"sensitive payload").unwrap();
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0xAA;
    let err = channel_b.open(&ciphertext).expect_err("tamper should fail");
    assert!(matches!(err, ChannelError::TamperedFrame));
}

#[test]
fn reordered_frames_are_rejected() {
    let (mut initiator, mut responder) = handshake_pair(KemVariant::NtruHps2048509);
    let now = Instant::now();
    let hello = initiator.start(now).unwrap();
    for reply in responder.handle(&hello, now).unwrap() {
        for confirm in initiator.handle(&reply, now).unwrap() {
            responder.handle(&confirm, now).unwrap();
        }
    }
    let mut a = initiator.into_session().unwrap();
    let mut b = responder.into_session().unwrap();

    let mut wire = a.seal(b"first").unwrap();
    let second = a.seal(b"second").unwrap();
    wire.splice(0..0, second);

    let mut frames = decode_stream(&wire, MAX_FRAME_LEN);
    let frame = frames.next().unwrap().unwrap();
    assert!(matches!(b.open_frame(&frame), Err(ChannelError::TamperedFrame)));
    // once poisoned, even the in-order frame is refused
    let frame = frames.next().unwrap().unwrap();
    assert!(!matches!(b.open_frame(&frame), Ok(Inbound::Data(_))));
}
