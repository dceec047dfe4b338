//! Post-quantum secure channel
//!
//! This crate establishes encrypted, authenticated byte channels over any
//! `AsyncRead + AsyncWrite` socket using a KEM-only key exchange:
//! - ML-KEM-768, Classic McEliece 348864, or NTRU-HPS-2048-509 on their own
//! - ML-KEM-768 combined with NTRU or McEliece in a two-stage hybrid
//!
//! # Protocol Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     KEM Handshake                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  1. Hello              │  variant id + stage-0 public key   │
//! │  2. KemReply           │  stage-0 ciphertext (+ stage-1 pk) │
//! │  3. KemFinish          │  stage-1 ciphertext (hybrid only)  │
//! │  4. Keys               │  HKDF(secrets, salt = transcript)  │
//! │  5. Confirm (both)     │  HMAC over the transcript          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Afterwards every frame is AES-256-GCM sealed under directional keys that
//! rotate before their nonce space runs out.
//!
//! # Example
//!
//! ```rust,ignore
//! use pq_channel::{ChannelConfig, SharedContext};
//! use kem::{KemRegistry, KemVariant};
//! use tokio_util::sync::CancellationToken;
//!
//! let (ctx, mut events) = SharedContext::init(ChannelConfig::default(), KemRegistry::builtin())?;
//!
//! // Perform handshake (initiator side)
//! let mut conn = ctx.connect(stream, KemVariant::HybridMlKemNtru, CancellationToken::new()).await?;
//!
//! // Use the connection for encrypted communication
//! conn.send(b"Hello, quantum world!").await?;
//! conn.close().await?;
//! ctx.deinit()?;
//! ```

pub mod cipher;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handshake;
pub mod kdf;
pub mod lock;
pub mod session;
pub mod transcript;
pub mod types;

pub use codec::{decode_stream, encode_frame, Frame, FrameCodec, FrameKind, MAX_FRAME_LEN};
pub use config::{ChannelConfig, ChannelConfigBuilder};
pub use connection::{Connection, ConnectionState};
pub use context::{
    ConnectionEvent, ConnectionTable, Context, LocalContext, SharedContext, Termination,
};
pub use error::{ChannelError, Result};
pub use handshake::{Handshake, Phase};
pub use lock::{Lockable, MutexLock, NoopLock};
pub use session::{Inbound, SecureSession, SessionStats};
pub use transcript::TranscriptHash;
pub use types::{ConnectionId, HandshakeMessage, Role, SessionKeys};
