//! `GatekeepServer` builder and server loop.
//!
//! This ties the layers together: transport → protocol → session
//! controller → credential store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gatekeep_protocol::{Codec, IdentityKey, JsonCodec, ServerMessage};
use gatekeep_session::{AuthConfig, Effect, Persistence, SessionController};
use gatekeep_store::{CredentialStore, StoreSnapshot};
use gatekeep_transport::{ConnectionId, Incoming, Transport, WebSocketTransport};
use tokio::sync::{Mutex, mpsc, watch};

use crate::GatekeepError;
use crate::handler::handle_connection;

/// The current protocol version. Hosts must send this in their `Hello`
/// or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// How often the challenge-timeout sweep runs when it is enabled.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Where effects for one connected identity are delivered. The
/// [`ConnectionId`] lets a closing connection remove only its own entry.
pub(crate) type Outbox = (ConnectionId, mpsc::UnboundedSender<ServerMessage>);

/// Shared server state passed to each connection handler task.
///
/// Lock order: never hold `controller` while taking `outboxes`. Handlers
/// compute effects under the controller lock, release it, then
/// [`dispatch`](Self::dispatch). Key derivation and disk writes happen
/// with no controller lock held.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) controller: Mutex<SessionController>,
    pub(crate) outboxes: Mutex<HashMap<IdentityKey, Outbox>>,
    pub(crate) codec: C,
    /// Revision of the newest snapshot on disk. Held for the whole write,
    /// so writes never overlap.
    pub(crate) written: Mutex<Option<u64>>,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn new(controller: SessionController, codec: C) -> Self {
        Self {
            controller: Mutex::new(controller),
            outboxes: Mutex::new(HashMap::new()),
            codec,
            written: Mutex::new(None),
        }
    }

    /// Writes `snapshot` on a blocking thread unless a newer one is
    /// already on disk.
    pub(crate) async fn write_snapshot(
        &self,
        snapshot: StoreSnapshot,
    ) -> Result<(), GatekeepError> {
        let mut written = self.written.lock().await;
        let revision = snapshot.revision();
        if written.is_some_and(|done| done >= revision) {
            tracing::trace!(revision, "store snapshot already superseded");
            return Ok(());
        }
        tokio::task::spawn_blocking(move || snapshot.write()).await??;
        *written = Some(revision);
        Ok(())
    }

    /// Routes each effect to the outbox of the identity it targets.
    pub(crate) async fn dispatch(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let outboxes = self.outboxes.lock().await;
        for effect in effects {
            let Some((_, tx)) = outboxes.get(effect.target()) else {
                tracing::debug!(identity = %effect.target(), "dropping effect for absent identity");
                continue;
            };
            // A closed receiver means the connection is already tearing down.
            let _ = tx.send(to_message(effect));
        }
    }
}

/// The wire message that carries out an effect on the host.
pub(crate) fn to_message(effect: Effect) -> ServerMessage {
    match effect {
        Effect::Notify { notice, .. } => notice.into(),
        Effect::Teleport { to, .. } => ServerMessage::Teleport { position: to },
        Effect::RejectMove { back_to, .. } => ServerMessage::MoveRejected { position: back_to },
        Effect::Kick { reason, .. } => ServerMessage::Kicked { reason },
    }
}

/// Builder for configuring and starting a Gatekeep server.
///
/// # Example
///
/// ```rust,ignore
/// use gatekeep::prelude::*;
///
/// let server = GatekeepServer::builder()
///     .bind("0.0.0.0:8080")
///     .store_path("plugins/gatekeep/auth.yml")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct GatekeepServerBuilder {
    bind_addr: String,
    store_path: PathBuf,
    auth_config: AuthConfig,
}

impl GatekeepServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            store_path: PathBuf::from("auth.yml"),
            auth_config: AuthConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the credential store file. Parent directories are created on
    /// first save.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn auth_config(mut self, config: AuthConfig) -> Self {
        self.auth_config = config;
        self
    }

    /// Shorthand for setting [`AuthConfig::enforce_challenge_timeout`].
    pub fn enforce_challenge_timeout(mut self, enforce: bool) -> Self {
        self.auth_config.enforce_challenge_timeout = enforce;
        self
    }

    /// Shorthand for setting [`AuthConfig::hash_iterations`].
    pub fn hash_iterations(mut self, iterations: u32) -> Self {
        self.auth_config.hash_iterations = iterations;
        self
    }

    /// Binds the listener and loads the credential store.
    ///
    /// An unreadable store is logged and the server starts empty; only a
    /// bind failure is an error. Store writes after a successful challenge
    /// are queued for a writer task that [`run`](GatekeepServer::run)
    /// starts; only the newest queued snapshot is written.
    pub async fn build(self) -> Result<GatekeepServer<JsonCodec>, GatekeepError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let store = CredentialStore::open(self.store_path);

        let (queue, snapshots) = watch::channel(None);
        let controller = SessionController::new(store, self.auth_config).with_persistence(
            Persistence::deferred(move |snapshot| {
                queue.send_replace(Some(snapshot));
            }),
        );
        let state = Arc::new(ServerState::new(controller, JsonCodec));

        Ok(GatekeepServer {
            transport,
            state,
            snapshots,
        })
    }
}

impl Default for GatekeepServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Gatekeep server bound to its port.
///
/// Call [`run()`](Self::run) to start accepting connections. Take a
/// [`handle()`](Self::handle) first if something else (a signal handler,
/// a test) needs to reach the server afterwards.
pub struct GatekeepServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
    snapshots: watch::Receiver<Option<StoreSnapshot>>,
}

impl GatekeepServer<JsonCodec> {
    pub fn builder() -> GatekeepServerBuilder {
        GatekeepServerBuilder::new()
    }
}

impl<C: Codec> GatekeepServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, GatekeepError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle<C> {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop until the process ends.
    ///
    /// Each accepted socket gets its own task, which performs the
    /// WebSocket upgrade and then serves the connection. A store writer
    /// task always runs; when the challenge timeout is enforced, a sweep
    /// task kicks expired identities once a second.
    pub async fn run(mut self) -> Result<(), GatekeepError> {
        tokio::spawn(write_behind(Arc::clone(&self.state), self.snapshots.clone()));
        let enforce = self.state.controller.lock().await.config().enforce_challenge_timeout;
        if enforce {
            tokio::spawn(sweep_expired(Arc::clone(&self.state)));
        }
        tracing::info!(enforce_challenge_timeout = enforce, "Gatekeep server running");

        loop {
            match self.transport.accept().await {
                Ok(incoming) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let peer = incoming.peer_addr();
                        let conn = match incoming.upgrade().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "upgrade failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Kicks identities that stayed at the challenge past the timeout.
async fn sweep_expired<C: Codec>(state: Arc<ServerState<C>>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let effects = state.controller.lock().await.expire_pending();
        state.dispatch(effects).await;
    }
}

/// Writes queued store snapshots, newest first, one at a time.
async fn write_behind<C: Codec>(
    state: Arc<ServerState<C>>,
    mut snapshots: watch::Receiver<Option<StoreSnapshot>>,
) {
    while snapshots.changed().await.is_ok() {
        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };
        if let Err(e) = state.write_snapshot(snapshot).await {
            tracing::error!(error = %e, "failed to persist credential store");
        }
    }
}

/// A cheap, cloneable reference to a server that is (or will be) running.
pub struct ServerHandle<C: Codec = JsonCodec> {
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Clone for ServerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Codec> ServerHandle<C> {
    /// Writes the credential store to disk now. Call on shutdown.
    ///
    /// The controller lock is held only to take the snapshot.
    pub async fn flush(&self) -> Result<(), GatekeepError> {
        let snapshot = self.state.controller.lock().await.snapshot();
        self.state.write_snapshot(snapshot).await
    }

    /// Number of identities with an open connection.
    pub async fn connected(&self) -> usize {
        self.state.outboxes.lock().await.len()
    }

    /// Whether `name` is connected and past the challenge.
    pub async fn is_authenticated(&self, name: &str) -> bool {
        self.state
            .controller
            .lock()
            .await
            .registry()
            .is_authenticated(&IdentityKey::new(name))
    }
}
