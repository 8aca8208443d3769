//! WebSocket session lifecycle: handles one admitted client from upgrade
//! through disconnect, plus the close path for rejected clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::{OutboundMessage, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::Connection;
use super::handler::handle_message;
use super::heartbeat::run_heartbeat;
use crate::auth::{Admission, Rejection};
use crate::config::ServerConfig;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::metrics::{
    CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, MALFORMED_MESSAGES_TOTAL,
};
use crate::registry::AgentRegistry;
use crate::router::OrderRouter;

/// Close reason sent to every client when the relay stops.
const SHUTDOWN_REASON: &str = "server shutting down";

/// How long a rejected socket waits for the client's close reply.
const REJECT_LINGER: Duration = Duration::from_secs(5);

/// Shared handles a session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Agent registry.
    pub registry: Arc<AgentRegistry>,
    /// Order router over the same registry.
    pub router: OrderRouter,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Server-wide shutdown token.
    pub shutdown: CancellationToken,
    /// Count of admitted, open connections.
    pub connections: Arc<AtomicUsize>,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseCause {
    /// The client closed or the stream ended.
    Client,
    /// A transport error.
    Error,
    /// The server is shutting down.
    Shutdown,
}

impl CloseCause {
    fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Error => "error",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Close a refused socket with code 1008 and the rejection's reason.
pub async fn reject(mut socket: WebSocket, rejection: Rejection) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static(rejection.close_reason()),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "failed to send rejection close frame");
        return;
    }
    // Let the client complete the close handshake before the socket drops.
    let _ = tokio::time::timeout(REJECT_LINGER, async {
        while let Some(Ok(msg)) = socket.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
}

/// Run a session for an admitted client.
///
/// 1. Registers an agent (superseding any previous one) or greets a saas client
/// 2. Starts the outbound writer and the heartbeat
/// 3. Dispatches inbound frames until the client leaves or the server stops
/// 4. Unregisters the agent if it is still the registered one
#[instrument(skip_all, fields(
    conn_id = tracing::field::Empty,
    role = %admission.role,
    restaurant_id = %admission.tenant_id,
    %peer,
))]
pub async fn run_session(
    socket: WebSocket,
    admission: Admission,
    ctx: SessionContext,
    mut lifecycle: Lifecycle,
    peer: SocketAddr,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(ctx.config.max_send_queue);
    let connection = Arc::new(Connection::new(
        admission.role,
        admission.tenant_id.clone(),
        send_tx,
    ));
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&connection.id));

    let role = admission.role;
    let conn_cancel = ctx.shutdown.child_token();

    // Outbound writer. Drains whatever is queued before honoring cancellation.
    let writer_cancel = conn_cancel.clone();
    let server_shutdown = ctx.shutdown.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                () = writer_cancel.cancelled() => break,
            }
        }
        if server_shutdown.is_cancelled() {
            let frame = CloseFrame {
                code: close_code::AWAY,
                reason: Utf8Bytes::from_static(SHUTDOWN_REASON),
            };
            let _ = ws_tx.send(Message::Close(Some(frame))).await;
        }
        let _ = ws_tx.close().await;
    });

    admit(&ctx, &admission, &connection, &mut lifecycle);

    let _ = ctx.connections.fetch_add(1, Ordering::Relaxed);
    counter!(CONNECTIONS_TOTAL, "role" => role.as_str()).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
    info!(credential = admission.credential.as_str(), "client connected");

    let heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        ctx.config.heartbeat_interval(),
        conn_cancel.clone(),
    ));

    let cause = loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(text.as_str(), &connection, &ctx.router),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => dispatch(text, &connection, &ctx.router),
                    Err(_) => {
                        warn!(len = data.len(), "non-UTF-8 binary frame dropped");
                        counter!(MALFORMED_MESSAGES_TOTAL, "kind" => "binary").increment(1);
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "client sent close frame");
                    break CloseCause::Client;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "socket error");
                    break CloseCause::Error;
                }
                None => break CloseCause::Client,
            },
            () = ctx.shutdown.cancelled() => break CloseCause::Shutdown,
        }
    };

    // Close path: stop accepting writes, stop tasks, unregister.
    let _ = connection.mark_closed();
    conn_cancel.cancel();
    let _ = heartbeat.await;
    if tokio::time::timeout(ctx.config.shutdown_timeout(), &mut writer)
        .await
        .is_err()
    {
        warn!("writer did not finish, aborting");
        writer.abort();
    }

    if role == Role::Agent {
        let _ = ctx.registry.unregister(&admission.tenant_id, &connection);
    }
    lifecycle.step(LifecycleState::Closed);

    let _ = ctx.connections.fetch_sub(1, Ordering::Relaxed);
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(CONNECTION_DURATION_SECONDS, "role" => role.as_str())
        .record(connection.age().as_secs_f64());
    info!(
        cause = cause.as_str(),
        duration_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

/// Greet the client and, for an agent, make it routable.
///
/// The agent's `agent_connected` is queued before it enters the registry, so
/// it always precedes the first routed order.
fn admit(
    ctx: &SessionContext,
    admission: &Admission,
    connection: &Arc<Connection>,
    lifecycle: &mut Lifecycle,
) {
    let greeting = match admission.role {
        Role::Agent => OutboundMessage::AgentConnected {
            restaurant_id: admission.tenant_id.clone(),
        },
        Role::Saas => OutboundMessage::Welcome {
            server: ctx.config.server_name.clone(),
        },
    };
    if let Err(e) = connection.send(&greeting) {
        warn!(error = %e, kind = greeting.kind(), "failed to queue greeting");
    }
    if admission.role == Role::Agent {
        let _ = ctx
            .registry
            .register(admission.tenant_id.clone(), connection.clone());
        lifecycle.step(LifecycleState::Registered);
    }
    lifecycle.step(LifecycleState::Active);
}

fn dispatch(raw: &str, connection: &Connection, router: &OrderRouter) {
    if let Some(reply) = handle_message(raw, connection, router) {
        if let Err(e) = connection.send(&reply) {
            warn!(error = %e, kind = reply.kind(), "failed to queue reply");
        }
    }
}

#[cfg(test)]
mod tests {
    // Socket-level behavior is covered by tests/integration.rs.
    use super::*;

    use crate::auth::Credential;
    use relay_core::{PrintOrder, TenantId};
    use serde_json::{Value, json};

    fn context() -> SessionContext {
        let registry = Arc::new(AgentRegistry::new());
        SessionContext {
            router: OrderRouter::new(registry.clone()),
            registry,
            config: Arc::new(ServerConfig::default()),
            shutdown: CancellationToken::new(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn admission(role: Role) -> Admission {
        Admission {
            tenant_id: TenantId::from_raw("r1"),
            role,
            credential: Credential::Master,
        }
    }

    fn bound(role: Role) -> Lifecycle {
        let mut lifecycle = Lifecycle::new();
        lifecycle.step(LifecycleState::Authenticating);
        lifecycle.bind(role).unwrap();
        lifecycle
    }

    fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn agent_greeting_precedes_first_routed_order() {
        let ctx = context();
        let adm = admission(Role::Agent);
        let (tx, mut rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new(Role::Agent, adm.tenant_id.clone(), tx));
        let mut lifecycle = bound(Role::Agent);

        admit(&ctx, &adm, &conn, &mut lifecycle);
        let outcome = ctx.router.route(&adm.tenant_id, PrintOrder::new("p1"));

        assert!(outcome.success);
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert_eq!(
            next_json(&mut rx),
            json!({"type": "agent_connected", "restaurantId": "r1"})
        );
        assert_eq!(next_json(&mut rx)["type"], "print_order");
    }

    #[test]
    fn saas_is_greeted_but_not_registered() {
        let ctx = context();
        let adm = admission(Role::Saas);
        let (tx, mut rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new(Role::Saas, adm.tenant_id.clone(), tx));
        let mut lifecycle = bound(Role::Saas);

        admit(&ctx, &adm, &conn, &mut lifecycle);

        assert!(ctx.registry.is_empty());
        assert_eq!(lifecycle.state(), LifecycleState::Active);
        assert_eq!(next_json(&mut rx)["type"], "welcome");
    }

    #[test]
    fn close_causes_have_labels() {
        assert_eq!(CloseCause::Client.as_str(), "client");
        assert_eq!(CloseCause::Error.as_str(), "error");
        assert_eq!(CloseCause::Shutdown.as_str(), "shutdown");
    }

    #[test]
    fn shutdown_reason_fits_close_frame() {
        // Close reasons are limited to 123 bytes.
        assert!(SHUTDOWN_REASON.len() <= 123);
        for r in [Rejection::Unauthorized, Rejection::MissingParams, Rejection::InvalidRole] {
            assert!(r.close_reason().len() <= 123);
        }
    }
}
