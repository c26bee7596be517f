//! The attention channel: one authenticated connection per session with a
//! bounded reconnection policy.
//!
//! ```text
//!   disconnected ──acquire──> connecting ──handshake ok──> connected
//!        ^                        │                           │
//!        └── attempts exhausted ──┘<──── retry after delay ───┘ (drop)
//! ```
//!
//! Emits issued before the connection is up are buffered and flushed once
//! connected. After release, or once reconnection gives up, every emit
//! returns `false`.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use domain::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::transport::{Connector, Link};

/// Broadcast capacity for inbound frames; a lagging listener skips the
/// oldest ones.
pub const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnection attempts after the first failure
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

enum Outgoing {
    Emit(Message),
    Close,
}

enum Exit {
    Released,
    Dropped,
}

#[derive(Clone)]
pub struct Channel {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    inbound: broadcast::Sender<Message>,
    state: watch::Receiver<ChannelState>,
}

impl Channel {
    /// Starts connecting in the background. Must be called inside a tokio
    /// runtime.
    pub fn open(connector: Arc<dyn Connector>, token: String, policy: ReconnectPolicy) -> Self {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);

        tokio::spawn(run(
            connector,
            token,
            policy,
            outgoing_rx,
            inbound.clone(),
            state_tx,
        ));

        Self {
            outgoing,
            inbound,
            state,
        }
    }

    /// Best-effort send; `false` when the channel is released or gave up
    pub fn emit(&self, message: Message) -> bool {
        self.outgoing.send(Outgoing::Emit(message)).is_ok()
    }

    /// Listen to every inbound frame from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inbound.subscribe()
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// `true` once released or once reconnection gave up
    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }

    /// Waits until the channel reaches `target`; `false` if it shut down first
    pub async fn wait_for(&self, target: ChannelState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|current| *current == target).await.is_ok();
        reached
    }

    /// Resolves once the channel is released or reconnection gave up.
    /// Listeners must watch this: the inbound sender outlives the task.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        while state.changed().await.is_ok() {}
    }

    /// Tears the connection down for good
    pub fn close(&self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

async fn run(
    connector: Arc<dyn Connector>,
    token: String,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    inbound: broadcast::Sender<Message>,
    state: watch::Sender<ChannelState>,
) {
    let mut buffered: VecDeque<Message> = VecDeque::new();
    let mut failures: u32 = 0;

    loop {
        state.send_replace(ChannelState::Connecting);

        match connector.connect(&token).await {
            Ok(mut link) => {
                info!("Channel connected");
                failures = 0;
                state.send_replace(ChannelState::Connected);

                match pump(&mut link, &mut outgoing, &inbound, &mut buffered).await {
                    Exit::Released => {
                        info!("Channel released");
                        state.send_replace(ChannelState::Disconnected);
                        return;
                    }
                    Exit::Dropped => {
                        warn!("Channel disconnected: connection lost");
                        state.send_replace(ChannelState::Disconnected);
                    }
                }
            }
            Err(e) => {
                error!("Channel connection error: {}", e);
                state.send_replace(ChannelState::Disconnected);
                if failures >= policy.attempts {
                    warn!(
                        "Channel gave up after {} reconnection attempts; {} buffered frames dropped",
                        policy.attempts,
                        buffered.len()
                    );
                    return;
                }
                failures += 1;
            }
        }

        if !wait_before_retry(policy.delay, &mut outgoing, &mut buffered).await {
            info!("Channel released while reconnecting");
            return;
        }
    }
}

/// Moves frames both ways until the link drops or the channel is released
async fn pump(
    link: &mut Link,
    outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    inbound: &broadcast::Sender<Message>,
    buffered: &mut VecDeque<Message>,
) -> Exit {
    while let Some(message) = buffered.pop_front() {
        if let Err(returned) = link.sender.send(message) {
            buffered.push_front(returned.0);
            return Exit::Dropped;
        }
    }

    loop {
        tokio::select! {
            received = link.receiver.recv() => match received {
                Some(message) => {
                    debug!("Received {}", message.event_name());
                    // No listener is not an error.
                    let _ = inbound.send(message);
                }
                None => return Exit::Dropped,
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Emit(message)) => {
                    debug!("Emitting {}", message.event_name());
                    if let Err(returned) = link.sender.send(message) {
                        buffered.push_back(returned.0);
                        return Exit::Dropped;
                    }
                }
                Some(Outgoing::Close) | None => return Exit::Released,
            },
        }
    }
}

/// Sleeps out the retry delay while still buffering emits; `false` if the
/// channel was released meanwhile.
async fn wait_before_retry(
    delay: Duration,
    outgoing: &mut mpsc::UnboundedReceiver<Outgoing>,
    buffered: &mut VecDeque<Message>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = outgoing.recv() => match command {
                Some(Outgoing::Emit(message)) => buffered.push_back(message),
                Some(Outgoing::Close) | None => return false,
            },
        }
    }
}
