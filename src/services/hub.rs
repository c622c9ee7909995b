//! Hub — fan-out of frames to connected websocket clients.
//!
//! DESIGN
//! ======
//! Every live connection registers an mpsc sender here. The coordinator
//! talks to the hub only through the `Transport` capability: one-to-one,
//! all-but-origin, and all. It never holds connection objects itself.
//!
//! ERROR HANDLING
//! ==============
//! Sends never block. Frames that change what a client must draw are
//! reliable: a client whose channel is full for one of them is evicted, its
//! socket loop sees the channel close, and it reconnects to a fresh
//! `load_canvas`. Relayed live segments are lossy and are simply skipped for
//! a full channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::Frame;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Broadcast capability used by the coordinator.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send to exactly one connection.
    async fn unicast(&self, to: Uuid, frame: Frame);

    /// Send to every connection except `origin`.
    async fn broadcast_others(&self, origin: Uuid, frame: Frame);

    /// Send to every connection, `origin` included.
    async fn broadcast_all(&self, frame: Frame);

    /// Send to every connection except `origin`, skipping any that are behind.
    async fn relay_others(&self, origin: Uuid, frame: Frame);
}

// =============================================================================
// HUB
// =============================================================================

/// Registry of outbound channels keyed by connection id.
#[derive(Clone, Default)]
pub struct Hub {
    clients: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Replaces any sender already held for the id.
    pub async fn register(&self, connection_id: Uuid, tx: mpsc::Sender<Frame>) {
        self.clients.write().await.insert(connection_id, tx);
    }

    /// Drop a connection's sender. Unknown ids are ignored.
    pub async fn unregister(&self, connection_id: Uuid) {
        self.clients.write().await.remove(&connection_id);
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn fan_out(&self, frame: &Frame, exclude: Option<Uuid>, mode: Mode) {
        let stale: Vec<Uuid> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(connection_id, _)| exclude != Some(**connection_id))
                .filter(|(connection_id, tx)| !try_deliver(**connection_id, tx, frame.clone(), mode))
                .map(|(connection_id, _)| *connection_id)
                .collect()
        };
        self.evict(&stale).await;
    }

    async fn evict(&self, stale: &[Uuid]) {
        if stale.is_empty() {
            return;
        }
        let mut clients = self.clients.write().await;
        for connection_id in stale {
            if clients.remove(connection_id).is_some() {
                warn!(%connection_id, "hub: evicted client that fell behind");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Reliable,
    Lossy,
}

/// Returns `false` when the connection should be evicted.
fn try_deliver(connection_id: Uuid, tx: &mpsc::Sender<Frame>, frame: Frame, mode: Mode) -> bool {
    let Err(e) = tx.try_send(frame) else {
        return true;
    };
    match e {
        mpsc::error::TrySendError::Full(_) if mode == Mode::Lossy => {
            debug!(%connection_id, "hub: skipped relay for busy client");
            true
        }
        mpsc::error::TrySendError::Full(_) => {
            warn!(%connection_id, "hub: channel full for reliable frame");
            false
        }
        mpsc::error::TrySendError::Closed(_) => false,
    }
}

#[async_trait::async_trait]
impl Transport for Hub {
    async fn unicast(&self, to: Uuid, frame: Frame) {
        let delivered = {
            let clients = self.clients.read().await;
            let Some(tx) = clients.get(&to) else {
                return;
            };
            try_deliver(to, tx, frame, Mode::Reliable)
        };
        if !delivered {
            self.evict(&[to]).await;
        }
    }

    async fn broadcast_others(&self, origin: Uuid, frame: Frame) {
        self.fan_out(&frame, Some(origin), Mode::Reliable).await;
    }

    async fn broadcast_all(&self, frame: Frame) {
        self.fan_out(&frame, None, Mode::Reliable).await;
    }

    async fn relay_others(&self, origin: Uuid, frame: Frame) {
        self.fan_out(&frame, Some(origin), Mode::Lossy).await;
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
