//! Key schedule: session keys, confirmation tags, and re-keying

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use kem::SharedSecret;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{ChannelError, Result};
use crate::transcript::TranscriptHash;
use crate::types::{Direction, Role, SessionKeys, CONFIRM_TAG_LEN, KEY_LEN};

const LABEL_I2R: &[u8] = b"pq-channel-v1-i2r";
const LABEL_R2I: &[u8] = b"pq-channel-v1-r2i";
const LABEL_CONFIRM: &[u8] = b"pq-channel-v1-confirm";
const LABEL_SESSION_ID: &[u8] = b"pq-channel-v1-session-id";
const LABEL_REKEY: &[u8] = b"pq-channel-v1-rekey";
const LABEL_CONFIRM_INITIATOR: &[u8] = b"initiator-confirm";
const LABEL_CONFIRM_RESPONDER: &[u8] = b"responder-confirm";

type HmacSha256 = Hmac<Sha256>;

fn expand(hk: &Hkdf<Sha256>, label: &[u8]) -> Result<[u8; KEY_LEN]> {
    let mut out = [0u8; KEY_LEN];
    hk.expand(label, &mut out)
        .map_err(|_| ChannelError::protocol("key expansion failed"))?;
    Ok(out)
}

/// Derive the session keys for `role`.
///
/// All KEM secrets, in stage order, are combined with the transcript hash as
/// salt. The secrets are consumed and wiped here.
pub fn derive(
    shared_secrets: Vec<SharedSecret>,
    transcript: &TranscriptHash,
    role: Role,
) -> Result<SessionKeys> {
    if shared_secrets.is_empty() {
        return Err(ChannelError::protocol("no shared secrets to derive from"));
    }

    let mut ikm = Vec::with_capacity(shared_secrets.len() * (2 + kem::SHARED_SECRET_LEN));
    for secret in &shared_secrets {
        ikm.extend_from_slice(&(secret.as_bytes().len() as u16).to_be_bytes());
        ikm.extend_from_slice(secret.as_bytes());
    }
    drop(shared_secrets);

    let hk = Hkdf::<Sha256>::new(Some(&transcript[..]), &ikm);
    ikm.zeroize();

    let mut i2r = expand(&hk, LABEL_I2R)?;
    let mut r2i = expand(&hk, LABEL_R2I)?;
    let confirm_key = expand(&hk, LABEL_CONFIRM)?;
    let session_id = expand(&hk, LABEL_SESSION_ID)?;

    let (send_key, recv_key) = match role {
        Role::Initiator => (i2r, r2i),
        Role::Responder => (r2i, i2r),
    };
    i2r.zeroize();
    r2i.zeroize();

    Ok(SessionKeys {
        send_key,
        recv_key,
        send_nonce: 0,
        recv_nonce: 0,
        confirm_key,
        session_id,
        transcript: *transcript,
        role,
    })
}

/// Confirmation tag a peer in `role` sends for these keys.
pub fn confirmation_tag(keys: &SessionKeys, role: Role) -> Result<[u8; CONFIRM_TAG_LEN]> {
    Ok(confirmation_mac(keys, role)?.finalize().into_bytes().into())
}

/// Constant-time check of a tag received from the peer in `role`.
pub fn verify_confirmation(keys: &SessionKeys, role: Role, tag: &[u8]) -> Result<()> {
    confirmation_mac(keys, role)?
        .verify_slice(tag)
        .map_err(|_| ChannelError::TranscriptMismatch)
}

fn confirmation_mac(keys: &SessionKeys, role: Role) -> Result<HmacSha256> {
    let label = match role {
        Role::Initiator => LABEL_CONFIRM_INITIATOR,
        Role::Responder => LABEL_CONFIRM_RESPONDER,
    };
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys.confirm_key)
        .map_err(|_| ChannelError::protocol("invalid confirmation key"))?;
    mac.update(label);
    mac.update(&keys.transcript);
    mac.update(&keys.session_id);
    Ok(mac)
}

/// Replace the key for one direction.
///
/// The new key is HKDF(old key, salt = extension) and that direction's
/// counter restarts at zero. The caller installs the result over `current`,
/// which wipes the old keys as they drop.
pub fn rekey(
    current: &SessionKeys,
    direction: Direction,
    extension: &[u8],
) -> Result<SessionKeys> {
    let old = match direction {
        Direction::Send => &current.send_key,
        Direction::Recv => &current.recv_key,
    };
    let hk = Hkdf::<Sha256>::new(Some(extension), old);
    let fresh = expand(&hk, LABEL_REKEY)?;

    let mut next = SessionKeys {
        send_key: current.send_key,
        recv_key: current.recv_key,
        send_nonce: current.send_nonce,
        recv_nonce: current.recv_nonce,
        confirm_key: current.confirm_key,
        session_id: current.session_id,
        transcript: current.transcript,
        role: current.role,
    };
    match direction {
        Direction::Send => {
            next.send_key = fresh;
            next.send_nonce = 0;
        }
        Direction::Recv => {
            next.recv_key = fresh;
            next.recv_nonce = 0;
        }
    }
    Ok(next)
}
