//! Process-wide context: configuration, KEM registry, connection table
//!
//! A [`Context`] is created with [`Context::init`] before the first
//! connection and retired with [`Context::deinit`] after the last one has
//! terminated. There is no global state; everything hangs off the context.

use std::collections::HashMap;
use std::sync::Arc;

use kem::{KemRegistry, KemVariant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::connection::{self, Connection, ConnectionState};
use crate::error::{ChannelError, Result};
use crate::lock::{Lockable, MutexLock, NoopLock};
use crate::types::{ConnectionId, Role};

/// How a connection ended
#[derive(Clone, Debug)]
pub enum Termination {
    /// Graceful close, marker sent or received
    Closed,
    /// Fatal error, cancellation included
    Failed(ChannelError),
    /// Dropped or aborted without a close marker
    Aborted,
}

/// Reported exactly once per connection
#[derive(Clone, Debug)]
pub struct ConnectionEvent {
    pub id: ConnectionId,
    pub role: Role,
    pub outcome: Termination,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub role: Role,
    pub state: ConnectionState,
    pub variant: Option<KemVariant>,
}

/// Live connections of one context
#[derive(Debug, Default)]
pub struct ConnectionTable {
    next_id: ConnectionId,
    entries: HashMap<ConnectionId, ConnectionEntry>,
    retired: bool,
}

impl ConnectionTable {
    fn insert(&mut self, role: Role) -> Result<ConnectionId> {
        if self.retired {
            return Err(ChannelError::Closed);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            ConnectionEntry {
                role,
                state: ConnectionState::Connecting,
                variant: None,
            },
        );
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(&id)
    }
}

pub(crate) struct Shared<L> {
    pub(crate) config: ChannelConfig,
    pub(crate) registry: Arc<KemRegistry>,
    table: L,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

/// Context shared by connections on any thread
pub type SharedContext = Context<MutexLock<ConnectionTable>>;

/// Context for a single-threaded runtime; its connections are `!Send`
pub type LocalContext = Context<NoopLock<ConnectionTable>>;

/// Owner of everything connections have in common
pub struct Context<L: Lockable<ConnectionTable> = MutexLock<ConnectionTable>> {
    shared: Arc<Shared<L>>,
}

impl<L: Lockable<ConnectionTable>> Clone for Context<L> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<L: Lockable<ConnectionTable>> Context<L> {
    /// Create a context and the receiver for its termination events
    pub fn init(
        config: ChannelConfig,
        registry: KemRegistry,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        config.validate()?;
        if !registry.supports(config.offered_variant) {
            return Err(ChannelError::InvalidConfig(format!(
                "no KEM registered for offered variant {}",
                config.offered_variant
            )));
        }
        let (events, receiver) = mpsc::unbounded_channel();

        if config.verbose_logging {
            tracing::debug!(?config, "Context initialised");
        }
        let shared = Shared {
            config,
            registry: Arc::new(registry),
            table: L::new(ConnectionTable::default()),
            events,
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        ))
    }

    /// Retire the context. Fails with [`ChannelError::Busy`] while any
    /// connection is still live; afterwards no new connections start.
    pub fn deinit(&self) -> Result<()> {
        self.shared.table.with(|table| {
            if !table.is_empty() {
                return Err(ChannelError::Busy(table.len()));
            }
            table.retired = true;
            Ok(())
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Number of connections that have not terminated
    pub fn live_connections(&self) -> usize {
        self.shared.table.with(|table| table.len())
    }

    pub fn connection_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.shared
            .table
            .with(|table| table.get(id).map(|entry| entry.state))
    }

    /// Run the initiating handshake over `socket` with `variant`
    pub async fn connect<S>(
        &self,
        socket: S,
        variant: KemVariant,
        cancel: CancellationToken,
    ) -> Result<Connection<S, L>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = self.shared.config.clone().with_variant(variant);
        let registration = Registration::new(self.shared.clone(), Role::Initiator)?;
        connection::establish(socket, config, self.shared.registry.clone(), registration, cancel)
            .await
    }

    /// Run the responding handshake over `socket`
    pub async fn accept<S>(&self, socket: S, cancel: CancellationToken) -> Result<Connection<S, L>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = self.shared.config.clone();
        let registration = Registration::new(self.shared.clone(), Role::Responder)?;
        connection::establish(socket, config, self.shared.registry.clone(), registration, cancel)
            .await
    }
}

/// A connection's slot in the table.
///
/// Reports the termination exactly once and removes the entry; if dropped
/// before anything was reported it reports [`Termination::Aborted`].
pub(crate) struct Registration<L: Lockable<ConnectionTable>> {
    shared: Arc<Shared<L>>,
    id: ConnectionId,
    role: Role,
    reported: bool,
}

impl<L: Lockable<ConnectionTable>> Registration<L> {
    fn new(shared: Arc<Shared<L>>, role: Role) -> Result<Self> {
        let id = shared.table.with(|table| table.insert(role))?;
        Ok(Self {
            shared,
            id,
            role,
            reported: false,
        })
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let id = self.id;
        self.shared.table.with(|table| {
            if let Some(entry) = table.entries.get_mut(&id) {
                entry.state = state;
            }
        });
    }

    pub(crate) fn set_variant(&self, variant: KemVariant) {
        let id = self.id;
        self.shared.table.with(|table| {
            if let Some(entry) = table.entries.get_mut(&id) {
                entry.variant = Some(variant);
            }
        });
    }

    /// Leave the table and report `outcome`; later calls do nothing
    pub(crate) fn finish(&mut self, outcome: Termination) {
        if self.reported {
            return;
        }
        self.reported = true;
        let id = self.id;
        self.shared.table.with(|table| table.entries.remove(&id));

        tracing::debug!(id, role = %self.role, ?outcome, "Connection terminated");
        let event = ConnectionEvent {
            id,
            role: self.role,
            outcome,
        };
        // the owner may have stopped listening; the connection is gone either way
        let _ = self.shared.events.send(event);
    }
}

impl<L: Lockable<ConnectionTable>> Drop for Registration<L> {
    fn drop(&mut self) {
        self.finish(Termination::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (SharedContext, mpsc::UnboundedReceiver<ConnectionEvent>) {
        SharedContext::init(ChannelConfig::default(), KemRegistry::builtin()).unwrap()
    }

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = ChannelConfig::default().with_rekey_after(0);
        assert!(matches!(
            SharedContext::init(config, KemRegistry::builtin()),
            Err(ChannelError::InvalidConfig(_))
        ));
        assert!(matches!(
            SharedContext::init(ChannelConfig::default(), KemRegistry::empty()),
            Err(ChannelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_registration_reports_once() {
        let (ctx, mut events) = context();
        let mut registration = Registration::new(ctx.shared.clone(), Role::Initiator).unwrap();
        let id = registration.id();
        assert_eq!(ctx.live_connections(), 1);
        assert_eq!(ctx.connection_state(id), Some(ConnectionState::Connecting));

        registration.finish(Termination::Closed);
        registration.finish(Termination::Failed(ChannelError::TamperedFrame));
        drop(registration);

        let event = events.try_recv().unwrap();
        assert_eq!(event.id, id);
        assert!(matches!(event.outcome, Termination::Closed));
        assert!(events.try_recv().is_err());
        assert_eq!(ctx.live_connections(), 0);
    }

    #[test]
    fn test_dropped_registration_reports_aborted() {
        let (ctx, mut events) = context();
        let registration = Registration::new(ctx.shared.clone(), Role::Responder).unwrap();
        drop(registration);
        assert!(matches!(events.try_recv().unwrap().outcome, Termination::Aborted));
    }

    #[test]
    fn test_deinit_waits_for_connections() {
        let (ctx, _events) = context();
        let registration = Registration::new(ctx.shared.clone(), Role::Initiator).unwrap();
        assert!(matches!(ctx.deinit(), Err(ChannelError::Busy(1))));

        drop(registration);
        ctx.deinit().unwrap();
        assert!(matches!(
            Registration::new(ctx.shared.clone(), Role::Initiator),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn test_local_context_table() {
        let (ctx, mut events) =
            LocalContext::init(ChannelConfig::default(), KemRegistry::builtin()).unwrap();
        let a = Registration::new(ctx.shared.clone(), Role::Initiator).unwrap();
        let b = Registration::new(ctx.shared.clone(), Role::Responder).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(ctx.live_connections(), 2);
        drop(a);
        drop(b);
        assert_eq!(ctx.live_connections(), 0);
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_ok());
    }
}
