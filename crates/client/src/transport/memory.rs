use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use async_trait::async_trait;
use domain::{relay::Directory, Claims, Message};
use tokio::sync::mpsc;
use tracing::warn;

use super::{Connector, Link, TransportError};
use crate::relay::Switchboard;

/// Relay running inside the process. Each `connect` registers the caller
/// with a shared switchboard, the same way a remote relay would.
pub struct MemoryRelay<D: Directory + 'static> {
    switchboard: Arc<Mutex<Switchboard<D>>>,
    reachable: AtomicBool,
    attempts: AtomicUsize,
}

impl<D: Directory + 'static> MemoryRelay<D> {
    pub fn new(directory: D) -> Arc<Self> {
        Arc::new(Self {
            switchboard: Arc::new(Mutex::new(Switchboard::new(directory))),
            reachable: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        })
    }

    /// While unreachable every handshake fails
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Handshakes attempted so far, successful or not
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.switchboard().is_connected(user_id)
    }

    /// Simulates a network drop for one user
    pub fn drop_connection(&self, user_id: &str) -> bool {
        self.switchboard().disconnect(user_id)
    }

    /// Injects a frame as if it came from the relay
    pub fn push(&self, user_id: &str, message: Message) -> bool {
        self.switchboard().send_to(user_id, message)
    }

    fn switchboard(&self) -> std::sync::MutexGuard<'_, Switchboard<D>> {
        self.switchboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<D: Directory + 'static> Connector for MemoryRelay<D> {
    async fn connect(&self, token: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Handshake("relay unreachable".to_string()));
        }
        let claims =
            Claims::decode(token).map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (to_relay, mut from_client) = mpsc::unbounded_channel::<Message>();
        let (to_client, from_relay) = mpsc::unbounded_channel::<Message>();
        let connection = self.switchboard().register(&claims, to_client);

        let switchboard = self.switchboard.clone();
        tokio::spawn(async move {
            while let Some(message) = from_client.recv().await {
                let mut board = switchboard.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = board.route(&claims, message) {
                    warn!("Relay rejected frame from {}: {}", claims.id, e);
                }
            }
            switchboard
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unregister(&claims.id, connection);
        });

        Ok(Link {
            sender: to_relay,
            receiver: from_relay,
        })
    }
}
