//! Socket-backed connections
//!
//! A [`Connection`] owns its socket (behind a [`FrameCodec`]) and, after the
//! handshake, its [`SecureSession`]. Any fatal error drops both on the spot,
//! which releases the socket and wipes the keys, and reports the
//! termination once through the context.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use kem::{KemRegistry, KemVariant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{Frame, FrameCodec, FrameKind};
use crate::config::ChannelConfig;
use crate::context::{ConnectionTable, Registration, Termination};
use crate::error::{ChannelError, Result};
use crate::handshake::Handshake;
use crate::lock::{Lockable, MutexLock};
use crate::session::{Inbound, SecureSession, SessionStats};
use crate::transcript::TranscriptHash;
use crate::types::{ConnectionId, Role};

/// Connection lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Established,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

/// An established, encrypted connection
pub struct Connection<S, L: Lockable<ConnectionTable> = MutexLock<ConnectionTable>> {
    framed: Option<Framed<S, FrameCodec>>,
    session: Option<SecureSession>,
    state: ConnectionState,
    registration: Registration<L>,
    cancel: CancellationToken,
    variant: KemVariant,
    transcript: TranscriptHash,
    final_stats: SessionStats,
}

/// Run the handshake for `registration` and wrap the result.
///
/// On every error path the handshake state (and its key pairs) and the
/// socket are dropped before the error is returned.
pub(crate) async fn establish<S, L>(
    socket: S,
    config: ChannelConfig,
    registry: Arc<KemRegistry>,
    mut registration: Registration<L>,
    cancel: CancellationToken,
) -> Result<Connection<S, L>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    L: Lockable<ConnectionTable>,
{
    let mut framed = Framed::new(socket, FrameCodec::new(config.max_frame_len));
    let now = Instant::now();
    let mut handshake = match registration.role() {
        Role::Initiator => Handshake::initiator(config, registry, now),
        Role::Responder => Handshake::responder(config, registry, now),
    };
    registration.set_state(ConnectionState::Handshaking);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChannelError::Cancelled),
        result = drive_handshake(&mut framed, &mut handshake) => result,
    };

    if let Err(e) = result {
        drop(handshake);
        drop(framed);
        registration.set_state(ConnectionState::Failed);
        registration.finish(Termination::Failed(e.clone()));
        return Err(e);
    }

    let variant = handshake
        .variant()
        .ok_or_else(|| ChannelError::protocol("established without a variant"));
    let transcript = handshake
        .transcript_hash()
        .ok_or_else(|| ChannelError::protocol("established without a transcript"));
    let session = handshake.into_session();
    let (variant, transcript, session) = match (variant, transcript, session) {
        (Ok(v), Ok(t), Ok(s)) => (v, t, s),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            registration.finish(Termination::Failed(e.clone()));
            return Err(e);
        }
    };

    registration.set_variant(variant);
    registration.set_state(ConnectionState::Established);
    tracing::info!(
        id = registration.id(),
        role = %registration.role(),
        variant = %variant,
        session_id = %hex::encode(session.session_id()),
        "Connection established"
    );

    Ok(Connection {
        framed: Some(framed),
        session: Some(session),
        state: ConnectionState::Established,
        registration,
        cancel,
        variant,
        transcript,
        final_stats: SessionStats::default(),
    })
}

async fn drive_handshake<S>(
    framed: &mut Framed<S, FrameCodec>,
    handshake: &mut Handshake,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if handshake.role() == Role::Initiator {
        let hello = handshake.start(Instant::now())?;
        within_phase(handshake, framed.send(Frame::new(FrameKind::Handshake, hello))).await?;
    }

    while !handshake.is_established() {
        let next = within_phase(handshake, async { Ok(framed.next().await) }).await?;
        let frame = match next {
            None => {
                return Err(ChannelError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed during handshake",
                )))
            }
            Some(frame) => frame?,
        };
        if frame.kind != FrameKind::Handshake {
            return Err(ChannelError::protocol(format!(
                "{:?} frame during handshake",
                frame.kind
            )));
        }

        let replies = handshake.handle(&frame.payload, Instant::now())?;
        let sink = &mut *framed;
        let written = async move {
            for reply in replies {
                sink.feed(Frame::new(FrameKind::Handshake, reply)).await?;
            }
            sink.flush().await
        };
        within_phase(handshake, written).await?;
    }
    Ok(())
}

/// Run one handshake read or write against the current phase deadline.
///
/// A peer that stops reading stalls writes just like a silent peer stalls
/// reads; both end in `HandshakeTimeout`.
async fn within_phase<T>(
    handshake: &mut Handshake,
    io: impl Future<Output = Result<T>>,
) -> Result<T> {
    let deadline = handshake.deadline();
    match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), io).await {
        Ok(result) => result,
        Err(_elapsed) => {
            handshake.check_timeout(deadline)?;
            Err(ChannelError::HandshakeTimeout)
        }
    }
}

impl<S, L> Connection<S, L>
where
    S: AsyncRead + AsyncWrite + Unpin,
    L: Lockable<ConnectionTable>,
{
    pub fn id(&self) -> ConnectionId {
        self.registration.id()
    }

    pub fn role(&self) -> Role {
        self.registration.role()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn variant(&self) -> KemVariant {
        self.variant
    }

    /// Transcript hash of the handshake, identical on both peers
    pub fn transcript_hash(&self) -> &TranscriptHash {
        &self.transcript
    }

    pub fn stats(&self) -> SessionStats {
        self.session
            .as_ref()
            .map(SecureSession::stats)
            .unwrap_or_else(|| self.final_stats.clone())
    }

    /// Seal and send one message
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Established {
            return Err(ChannelError::Closed);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ChannelError::Closed);
        };
        let frames = match session.seal_frame(FrameKind::Data, data) {
            Ok(frames) => frames,
            // too large for a frame: nothing was sealed, the session is intact
            Err(e @ ChannelError::FrameTooLarge { .. }) => return Err(e),
            Err(e) => return Err(self.fail(e)),
        };
        self.write_frames(frames).await
    }

    /// Receive the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed gracefully. Rekey frames
    /// are handled here and never surface.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                ConnectionState::Established => {}
                ConnectionState::Closed => return Ok(None),
                _ => return Err(ChannelError::Closed),
            }
            let Some(framed) = self.framed.as_mut() else {
                return Err(ChannelError::Closed);
            };

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.fail(ChannelError::Cancelled)),
                next = framed.next() => next,
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(self.fail(e)),
                None => {
                    return Err(self.fail(ChannelError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed without a close marker",
                    ))))
                }
            };

            let opened = match self.session.as_mut() {
                Some(session) => session.open_frame(&frame),
                None => Err(ChannelError::Closed),
            };
            match opened {
                Ok(Inbound::Data(data)) => return Ok(Some(data)),
                Ok(Inbound::Rekeyed) => continue,
                Ok(Inbound::Close) => {
                    tracing::debug!(id = self.id(), "Peer closed gracefully");
                    self.answer_close().await;
                    self.release(ConnectionState::Closed, Termination::Closed);
                    return Ok(None);
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Graceful close: send the close marker, shut the socket down, and
    /// release everything
    pub async fn close(mut self) -> Result<()> {
        match self.state {
            ConnectionState::Established => self.shutdown_graceful().await,
            ConnectionState::Closed => Ok(()),
            _ => Err(ChannelError::Closed),
        }
    }

    /// Abrupt close: no marker, socket dropped immediately
    pub fn abort(mut self) {
        self.release(ConnectionState::Closed, Termination::Aborted);
    }

    async fn shutdown_graceful(&mut self) -> Result<()> {
        self.state = ConnectionState::Closing;
        self.registration.set_state(ConnectionState::Closing);

        let frames = match self.session.as_mut() {
            Some(session) if !session.is_send_closed() => {
                match session.seal_frame(FrameKind::Close, &[]) {
                    Ok(frames) => frames,
                    Err(e) => return Err(self.fail(e)),
                }
            }
            _ => Vec::new(),
        };
        self.write_frames(frames).await?;

        if let Some(framed) = self.framed.as_mut() {
            // the marker is out; a failing shutdown does not change the outcome
            if let Err(e) = framed.get_mut().shutdown().await {
                tracing::debug!(id = self.registration.id(), error = %e, "Socket shutdown failed");
            }
        }
        self.release(ConnectionState::Closed, Termination::Closed);
        Ok(())
    }

    /// Send our own marker after the peer's. The peer may already be gone,
    /// so failures here do not change the outcome.
    async fn answer_close(&mut self) {
        self.state = ConnectionState::Closing;
        self.registration.set_state(ConnectionState::Closing);

        let frames = match self.session.as_mut() {
            Some(session) if !session.is_send_closed() => session
                .seal_frame(FrameKind::Close, &[])
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        let Some(framed) = self.framed.as_mut() else {
            return;
        };
        let sent: Result<()> = async {
            for frame in frames {
                framed.feed(frame).await?;
            }
            framed.flush().await?;
            framed.get_mut().shutdown().await?;
            Ok(())
        }
        .await;
        if let Err(e) = sent {
            tracing::debug!(id = self.registration.id(), error = %e, "Close reply not delivered");
        }
    }

    async fn write_frames(&mut self, frames: Vec<Frame>) -> Result<()> {
        let Some(framed) = self.framed.as_mut() else {
            return Err(ChannelError::Closed);
        };
        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChannelError::Cancelled),
            written = async {
                for frame in frames {
                    framed.feed(frame).await?;
                }
                framed.flush().await
            } => written,
        };
        written.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: ChannelError) -> ChannelError {
        tracing::warn!(id = self.registration.id(), error = %err, "Connection failed");
        self.release(ConnectionState::Failed, Termination::Failed(err.clone()));
        err
    }

    /// Drop the socket and keys, then report
    fn release(&mut self, state: ConnectionState, outcome: Termination) {
        if let Some(session) = self.session.take() {
            self.final_stats = session.stats();
        }
        self.framed = None;
        self.state = state;
        self.registration.set_state(state);
        self.registration.finish(outcome);
    }
}

impl<S, L: Lockable<ConnectionTable>> fmt::Debug for Connection<S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.registration.id())
            .field("role", &self.registration.role())
            .field("state", &self.state)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}
