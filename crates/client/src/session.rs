//! Session-scoped ownership of the bearer token and the channel.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use domain::Claims;
use tracing::{debug, warn};

use crate::channel::{Channel, ReconnectPolicy};
use crate::transport::Connector;

/// Where the bearer token lives between calls
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set(&self, token: String);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: String) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// A valid, decoded bearer token
#[derive(Clone, Debug)]
pub struct Credential {
    pub token: String,
    pub claims: Claims,
}

pub struct Session {
    store: Arc<dyn TokenStore>,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    channel: Mutex<Option<Channel>>,
}

impl Session {
    pub fn new(
        store: Arc<dyn TokenStore>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            store,
            connector,
            policy,
            channel: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The stored token if it decodes and has not expired
    pub fn credential(&self) -> Option<Credential> {
        let token = self.store.token()?;
        match Claims::decode(&token) {
            Ok(claims) if !claims.is_expired_at(Utc::now()) => Some(Credential { token, claims }),
            Ok(_) => {
                debug!("Stored token has expired");
                None
            }
            Err(e) => {
                warn!("Stored token is unusable: {}", e);
                None
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential().is_some()
    }

    /// The session's channel, created on first use. `None` without a valid
    /// credential.
    pub fn acquire(&self) -> Option<Channel> {
        let mut slot = self.channel.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(channel) = slot.as_ref() {
            if !channel.is_closed() {
                return Some(channel.clone());
            }
        }

        let credential = self.credential()?;
        let channel = Channel::open(self.connector.clone(), credential.token, self.policy);
        *slot = Some(channel.clone());
        Some(channel)
    }

    /// Closes the channel; a later `acquire` starts a fresh one
    pub fn release(&self) {
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(channel) = channel {
            channel.close();
        }
    }

    pub fn logout(&self) {
        self.release();
        self.store.clear();
    }
}
