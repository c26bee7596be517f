//! Binds the relay routing contract to live connections.

use std::collections::HashMap;

use domain::{
    relay::{Delivery, Directory, Dispatcher, Recipient},
    Claims, Message, Role,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Route {
    connection: u64,
    role: Role,
    sender: mpsc::UnboundedSender<Message>,
}

/// Connected clients keyed by user id, plus the dispatcher state.
/// One connection per user; a reconnect replaces the previous route.
pub struct Switchboard<D: Directory> {
    dispatcher: Dispatcher,
    directory: D,
    routes: HashMap<String, Route>,
    connections: u64,
}

impl<D: Directory> Switchboard<D> {
    pub fn new(directory: D) -> Self {
        Self {
            dispatcher: Dispatcher::default(),
            directory,
            routes: HashMap::new(),
            connections: 0,
        }
    }

    /// Returns the connection number to hand back to `unregister`
    pub fn register(&mut self, claims: &Claims, sender: mpsc::UnboundedSender<Message>) -> u64 {
        self.connections += 1;
        info!("{:?} {} connected", claims.user_type, claims.id);
        self.routes.insert(
            claims.id.clone(),
            Route {
                connection: self.connections,
                role: claims.user_type,
                sender,
            },
        );
        self.connections
    }

    /// Drops the route only if it still belongs to that connection. A
    /// departing patient's pending request is withdrawn from pharmacies.
    pub fn unregister(&mut self, user_id: &str, connection: u64) {
        let role = match self.routes.get(user_id) {
            Some(route) if route.connection == connection => route.role,
            _ => return,
        };
        self.routes.remove(user_id);
        info!("{} disconnected", user_id);

        if role == Role::Patient {
            for delivery in self.dispatcher.abandon(user_id) {
                self.deliver(delivery);
            }
        }
    }

    /// Sends one frame straight to a connected user
    pub fn send_to(&self, user_id: &str, message: Message) -> bool {
        self.routes
            .get(user_id)
            .map(|route| route.sender.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Drops a user's route regardless of which connection owns it
    pub fn disconnect(&mut self, user_id: &str) -> bool {
        self.routes.remove(user_id).is_some()
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.routes.contains_key(user_id)
    }

    /// Routes one inbound frame; returns how many frames were delivered
    pub fn route(&mut self, sender: &Claims, message: Message) -> Result<usize, domain::Error> {
        debug!("Routing {} from {}", message.event_name(), sender.id);
        let deliveries = self
            .dispatcher
            .dispatch(sender, message, &self.directory)?;

        Ok(deliveries
            .into_iter()
            .map(|delivery| self.deliver(delivery))
            .sum())
    }

    fn deliver(&self, delivery: Delivery) -> usize {
        let Delivery { recipient, message } = delivery;

        self.routes
            .iter()
            .filter(|(user_id, route)| match &recipient {
                Recipient::User(id) => *user_id == id,
                Recipient::Pharmacies => route.role == Role::Pharmacy,
                Recipient::PharmaciesExcept(id) => route.role == Role::Pharmacy && *user_id != id,
            })
            .filter(|(_, route)| route.sender.send(message.clone()).is_ok())
            .count()
    }
}
