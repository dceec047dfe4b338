//! Length-prefixed wire framing
//!
//! ```text
//! ┌──────────────────────┬───────────┬─────────────────────┐
//! │ length (u32, BE)     │ kind (u8) │ payload             │
//! └──────────────────────┴───────────┴─────────────────────┘
//!   length = 1 + payload.len()
//! ```
//!
//! The declared length is checked against the limit before a single byte
//! of the body is buffered or allocated.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ChannelError, Result};

/// Hard upper bound on a frame body (kind byte + payload).
///
/// Large enough for a Classic McEliece 348864 public key inside a Hello.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Bytes preceding the payload: length prefix and kind.
pub const HEADER_LEN: usize = 5;

const LENGTH_PREFIX_LEN: usize = 4;

/// Frame kind carried in the flags byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Handshake = 0x01,
    Data = 0x02,
    Rekey = 0x04,
    Close = 0x08,
}

impl FrameKind {
    pub fn from_flags(flags: u8) -> Result<Self> {
        match flags {
            0x01 => Ok(FrameKind::Handshake),
            0x02 => Ok(FrameKind::Data),
            0x04 => Ok(FrameKind::Rekey),
            0x08 => Ok(FrameKind::Close),
            other => Err(ChannelError::protocol(format!(
                "unknown frame flags 0x{:02x}",
                other
            ))),
        }
    }

    pub fn flags(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Value of the length prefix for this frame.
    pub fn body_len(&self) -> usize {
        1 + self.payload.len()
    }

    pub fn encode(&self, max_frame_len: usize) -> Result<Vec<u8>> {
        let header = frame_header(self.kind, self.payload.len(), max_frame_len)?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Header bytes for a frame of `kind` carrying `payload_len` bytes.
pub fn frame_header(
    kind: FrameKind,
    payload_len: usize,
    max_frame_len: usize,
) -> Result<[u8; HEADER_LEN]> {
    let body_len = payload_len + 1;
    let max = max_frame_len.min(MAX_FRAME_LEN);
    if body_len > max {
        return Err(ChannelError::FrameTooLarge {
            declared: body_len,
            max,
        });
    }
    let mut header = [0u8; HEADER_LEN];
    header[..LENGTH_PREFIX_LEN].copy_from_slice(&(body_len as u32).to_be_bytes());
    header[LENGTH_PREFIX_LEN] = kind.flags();
    Ok(header)
}

/// Encode one frame with the default limit.
pub fn encode_frame(kind: FrameKind, payload: &[u8]) -> Result<Vec<u8>> {
    Frame::new(kind, Bytes::copy_from_slice(payload)).encode(MAX_FRAME_LEN)
}

/// Inspect the head of `buf`.
///
/// Returns the total on-wire size of the first frame once enough bytes are
/// present to know it, `None` while the length prefix is still incomplete.
fn peek_frame_len(buf: &[u8], max_frame_len: usize) -> Result<Option<usize>> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX_LEN]);
    let declared = u32::from_be_bytes(prefix) as usize;

    let max = max_frame_len.min(MAX_FRAME_LEN);
    if declared > max {
        return Err(ChannelError::FrameTooLarge { declared, max });
    }
    if declared == 0 {
        return Err(ChannelError::protocol("zero-length frame"));
    }
    Ok(Some(LENGTH_PREFIX_LEN + declared))
}

/// Lazily decode complete frames from `buf`.
///
/// Iteration stops at the first incomplete frame; [`FrameIter::remainder`]
/// then holds the bytes to prepend to the next read. After an error the
/// iterator is exhausted.
pub fn decode_stream(buf: &[u8], max_frame_len: usize) -> FrameIter<'_> {
    FrameIter {
        buf,
        pos: 0,
        max_frame_len,
        failed: false,
    }
}

pub struct FrameIter<'a> {
    buf: &'a [u8],
    pos: usize,
    max_frame_len: usize,
    failed: bool,
}

impl<'a> FrameIter<'a> {
    /// Bytes not yet turned into frames.
    pub fn remainder(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

impl Iterator for FrameIter<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let total = match peek_frame_len(rest, self.max_frame_len) {
            Ok(Some(total)) if rest.len() >= total => total,
            Ok(_) => return None,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let kind = match FrameKind::from_flags(rest[LENGTH_PREFIX_LEN]) {
            Ok(kind) => kind,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let payload = Bytes::copy_from_slice(&rest[HEADER_LEN..total]);
        self.pos += total;
        Some(Ok(Frame { kind, payload }))
    }
}

/// `tokio_util` codec applying the same rules as [`decode_stream`].
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: max_frame_len.min(MAX_FRAME_LEN),
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ChannelError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(total) = peek_frame_len(src, self.max_frame_len)? else {
            return Ok(None);
        };
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let kind = FrameKind::from_flags(src[LENGTH_PREFIX_LEN])?;
        let mut data = src.split_to(total);
        data.advance(HEADER_LEN);
        Ok(Some(Frame {
            kind,
            payload: data.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ChannelError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let header = frame_header(frame.kind, frame.payload.len(), self.max_frame_len)?;
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_slice(&header);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
