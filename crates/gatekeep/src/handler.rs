//! Per-connection handler: handshake, event routing, and effect delivery.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! One connection carries one identity. The flow is:
//!   1. Receive `Hello` → validate version and name
//!   2. Claim the identity's outbox (409 if it is already connected)
//!   3. Send `Welcome`, then report `Connected` to the controller
//!   4. Loop: inbound envelopes become host events; outbox messages go out

use std::sync::Arc;
use std::time::{Duration, Instant};

use gatekeep_protocol::{
    ClientMessage, Codec, Envelope, IdentityKey, Payload, Position, ProtocolError, ServerMessage,
};
use gatekeep_session::{CommandPlan, HostEvent};
use gatekeep_store::unix_millis;
use gatekeep_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::GatekeepError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// How long a new connection has to send `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a connection may go without any frame before it is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest accepted identity name.
const MAX_NAME_LEN: usize = 16;

/// Drop guard that reports the disconnect and frees the outbox when the
/// handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct SessionGuard<C: Codec> {
    identity: IdentityKey,
    conn_id: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        let identity = self.identity.clone();
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            // Disconnected first: the name stays claimed until the session
            // is gone, so a reconnect can't race its own teardown.
            state
                .controller
                .lock()
                .await
                .handle(HostEvent::Disconnected {
                    identity: identity.clone(),
                });

            let mut outboxes = state.outboxes.lock().await;
            if outboxes.get(&identity).is_some_and(|(id, _)| *id == conn_id) {
                outboxes.remove(&identity);
            }
        });
    }
}

/// Outbound sequencing for one connection.
struct Outgoing {
    seq: u64,
    start: Instant,
}

impl Outgoing {
    fn new() -> Self {
        Self {
            seq: 0,
            start: Instant::now(),
        }
    }

    /// Wraps `msg` in the next envelope.
    fn envelope(&mut self, msg: ServerMessage) -> Envelope {
        let seq = self.seq;
        self.seq += 1;
        Envelope {
            seq,
            timestamp: self.start.elapsed().as_millis() as u64,
            payload: Payload::Server(msg),
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), GatekeepError> {
    let conn_id = conn.id();
    let origin = conn.peer_addr().ip().to_string();
    tracing::debug!(%conn_id, %origin, "handling new connection");

    let mut out = Outgoing::new();

    // --- Step 1: Hello ---
    let (identity, position) = perform_handshake(&conn, &state, &mut out).await?;

    // --- Step 2: claim the outbox ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    let claimed = {
        let mut outboxes = state.outboxes.lock().await;
        if outboxes.contains_key(&identity) {
            false
        } else {
            outboxes.insert(identity.clone(), (conn_id, tx));
            true
        }
    };
    if !claimed {
        send(&conn, &state.codec, &mut out, error(409, format!("{identity} is already connected")))
            .await?;
        return Err(ProtocolError::InvalidMessage(format!("duplicate identity {identity}")).into());
    }
    let _guard = SessionGuard {
        identity: identity.clone(),
        conn_id,
        state: Arc::clone(&state),
    };

    // --- Step 3: Welcome, then let the controller decide ---
    send(
        &conn,
        &state.codec,
        &mut out,
        ServerMessage::Welcome {
            identity: identity.clone(),
            server_time: unix_millis(),
        },
    )
    .await?;
    tracing::info!(%conn_id, %identity, %origin, "identity connected");

    let effects = state.controller.lock().await.handle(HostEvent::Connected {
        identity: identity.clone(),
        origin,
        position,
    });
    state.dispatch(effects).await;

    // --- Step 4: message loop ---
    loop {
        tokio::select! {
            inbound = tokio::time::timeout(IDLE_TIMEOUT, conn.recv()) => {
                let data = match inbound {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        tracing::info!(%identity, "connection closed cleanly");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(%identity, error = %e, "recv error");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(%identity, "connection idle, dropping");
                        break;
                    }
                };
                if !handle_frame(&conn, &state, &mut out, &identity, &data).await? {
                    break;
                }
            }
            Some(msg) = rx.recv() => {
                let kicked = matches!(msg, ServerMessage::Kicked { .. });
                send(&conn, &state.codec, &mut out, msg).await?;
                if kicked {
                    tracing::info!(%identity, "identity kicked");
                    let _ = conn.close().await;
                    break;
                }
            }
        }
    }

    // _guard drops here → Disconnected fires.
    Ok(())
}

/// Receives and validates `Hello`. Returns the canonical identity and the
/// position it spawned at.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    out: &mut Outgoing,
) -> Result<(IdentityKey, Position), GatekeepError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(
                ProtocolError::InvalidMessage("connection closed before Hello".into()).into(),
            );
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ProtocolError::InvalidMessage("Hello timed out".into()).into()),
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            send(conn, &state.codec, out, error(400, format!("malformed envelope: {e}"))).await?;
            return Err(e.into());
        }
    };

    let Payload::Client(ClientMessage::Hello {
        version,
        name,
        position,
    }) = envelope.payload
    else {
        send(conn, &state.codec, out, error(400, "expected Hello")).await?;
        return Err(ProtocolError::InvalidMessage("first message must be Hello".into()).into());
    };

    if version != PROTOCOL_VERSION {
        send(
            conn,
            &state.codec,
            out,
            error(400, format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}")),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    if let Err(reason) = validate_name(&name) {
        send(conn, &state.codec, out, error(400, reason)).await?;
        return Err(ProtocolError::InvalidMessage(reason.into()).into());
    }

    Ok((IdentityKey::new(name), position))
}

/// Names end up as the first field of a store line, so only the
/// characters game usernames allow are accepted.
fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name is too long");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("name may only contain letters, digits and '_'");
    }
    Ok(())
}

/// Handles one inbound frame. Returns `false` when the connection should
/// close.
async fn handle_frame<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    out: &mut Outgoing,
    identity: &IdentityKey,
    data: &[u8],
) -> Result<bool, GatekeepError> {
    let envelope: Envelope = match state.codec.decode(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(%identity, error = %e, "failed to decode envelope");
            send(conn, &state.codec, out, error(400, format!("malformed envelope: {e}"))).await?;
            return Ok(true);
        }
    };

    let msg = match envelope.payload {
        Payload::Client(msg) => msg,
        Payload::Server(_) => {
            send(conn, &state.codec, out, error(400, "hosts send Client payloads")).await?;
            return Ok(true);
        }
    };

    let event = match msg {
        ClientMessage::Move { from, to } => HostEvent::MoveAttempt {
            identity: identity.clone(),
            from,
            to,
        },
        ClientMessage::Command { verb, args } => {
            run_command(state, identity, &verb, &args).await;
            return Ok(true);
        }
        ClientMessage::Heartbeat { client_time } => {
            let ack = ServerMessage::HeartbeatAck {
                client_time,
                server_time: unix_millis(),
            };
            send(conn, &state.codec, out, ack).await?;
            return Ok(true);
        }
        ClientMessage::Bye { reason } => {
            tracing::info!(%identity, %reason, "host said bye");
            return Ok(false);
        }
        ClientMessage::Hello { .. } => {
            send(conn, &state.codec, out, error(400, "already said Hello")).await?;
            return Ok(true);
        }
    };

    // Lock only for the state transition; deliver after releasing it.
    let effects = state.controller.lock().await.handle(event);
    state.dispatch(effects).await;
    Ok(true)
}

/// Runs `register`/`login`. The controller lock is taken twice, around
/// the key derivation, never across it.
async fn run_command<C: Codec>(
    state: &ServerState<C>,
    identity: &IdentityKey,
    verb: &str,
    args: &[String],
) {
    let plan = state.controller.lock().await.plan_command(identity, verb, args);
    let effects = match plan {
        CommandPlan::Ready(effects) => effects,
        CommandPlan::Check(check) => match tokio::task::spawn_blocking(move || check.run()).await {
            Ok(checked) => state.controller.lock().await.finish_command(checked),
            Err(e) => {
                tracing::error!(%identity, error = %e, "secret check failed");
                return;
            }
        },
    };
    state.dispatch(effects).await;
}

fn error(code: u16, message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        code,
        message: message.into(),
    }
}

async fn send<C: Codec>(
    conn: &WebSocketConnection,
    codec: &C,
    out: &mut Outgoing,
    msg: ServerMessage,
) -> Result<(), GatekeepError> {
    let bytes = codec.encode(&out.envelope(msg))?;
    conn.send(&bytes).await?;
    Ok(())
}
