use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

type SocketSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

struct Peer {
    conn: u64,
    sink: SocketSink,
}

/// In-process registry of live sockets, partitioned by role. The registry is
/// guarded by RW-locks; each socket write half owns a private mutex so that
/// fan-out writes to the same peer serialize.
///
/// Delivery is best-effort: the store is the source of truth and clients
/// re-sync on reconnect, so failures here are logged and swallowed.
pub struct Hub {
    couriers: RwLock<HashMap<Uuid, Peer>>,
    customers: RwLock<HashMap<Uuid, Peer>>,
    conn_seq: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            couriers: RwLock::new(HashMap::new()),
            customers: RwLock::new(HashMap::new()),
            conn_seq: AtomicU64::new(1),
        }
    }

    /// Installs the socket for this courier, closing any previous one
    /// (newer login wins). Returns a token identifying this connection;
    /// the reader loop passes it back on unregister so a stale loop cannot
    /// evict its replacement.
    pub async fn register_courier(&self, id: Uuid, sink: SplitSink<WebSocket, Message>) -> u64 {
        register(&self.couriers, &self.conn_seq, id, sink).await
    }

    pub async fn register_customer(&self, id: Uuid, sink: SplitSink<WebSocket, Message>) -> u64 {
        register(&self.customers, &self.conn_seq, id, sink).await
    }

    pub async fn unregister_courier(&self, id: Uuid, conn: u64) {
        unregister(&self.couriers, id, conn).await;
    }

    pub async fn unregister_customer(&self, id: Uuid, conn: u64) {
        unregister(&self.customers, id, conn).await;
    }

    pub async fn notify_courier<T: Serialize>(&self, id: Uuid, event: &str, data: &T) {
        send(&self.couriers, "courier", id, event, data).await;
    }

    pub async fn notify_customer<T: Serialize>(&self, id: Uuid, event: &str, data: &T) {
        send(&self.customers, "customer", id, event, data).await;
    }

    pub async fn connected_couriers(&self) -> usize {
        self.couriers.read().await.len()
    }

    pub async fn connected_customers(&self) -> usize {
        self.customers.read().await.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

async fn register(
    registry: &RwLock<HashMap<Uuid, Peer>>,
    conn_seq: &AtomicU64,
    id: Uuid,
    sink: SplitSink<WebSocket, Message>,
) -> u64 {
    let conn = conn_seq.fetch_add(1, Ordering::Relaxed);
    let peer = Peer {
        conn,
        sink: Arc::new(Mutex::new(sink)),
    };
    let previous = { registry.write().await.insert(id, peer) };
    if let Some(previous) = previous {
        close(previous.sink).await;
    }
    conn
}

async fn unregister(registry: &RwLock<HashMap<Uuid, Peer>>, id: Uuid, conn: u64) {
    let removed = {
        let mut map = registry.write().await;
        match map.get(&id) {
            Some(peer) if peer.conn == conn => map.remove(&id),
            _ => None,
        }
    };
    if let Some(peer) = removed {
        close(peer.sink).await;
    }
}

async fn send<T: Serialize>(
    registry: &RwLock<HashMap<Uuid, Peer>>,
    role: &str,
    id: Uuid,
    event: &str,
    data: &T,
) {
    let sink = { registry.read().await.get(&id).map(|peer| peer.sink.clone()) };
    let Some(sink) = sink else {
        debug!(role, principal = %id, event, "peer not connected; dropping event");
        return;
    };

    let frame = match serde_json::to_string(&json!({ "event": event, "data": data })) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(role, principal = %id, event, error = %err, "failed to serialize event");
            return;
        }
    };

    // Failed writes are cleaned up by the peer's reader loop on its next
    // read error; nothing to do here beyond logging.
    let result = sink.lock().await.send(Message::Text(frame)).await;
    if let Err(err) = result {
        warn!(role, principal = %id, event, error = %err, "socket write failed");
    }
}

async fn close(sink: SocketSink) {
    let _ = sink.lock().await.send(Message::Close(None)).await;
}
