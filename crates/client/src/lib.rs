//! Attention Popup Client
//!
//! Session-owned channel to the relay, plus the patient and pharmacy
//! drivers that feed channel frames into the domain aggregates.

/// Attention channel and reconnection
pub mod channel;

/// Environment configuration
pub mod config;

/// Client errors
pub mod errors;

/// Patient medication lookup
pub mod medications;

/// Patient popup driver
pub mod patient;

/// Pharmacy popup driver
pub mod pharmacy;

/// Relay routing over live connections
pub mod relay;

/// Token storage and channel ownership
pub mod session;

/// Connectors
pub mod transport;

pub use channel::{Channel, ChannelState, ReconnectPolicy};
pub use config::Config;
pub use errors::ClientError;
pub use medications::{HttpMedicationLookup, MedicationLookup};
pub use patient::PatientClient;
pub use pharmacy::PharmacyClient;
pub use session::{MemoryTokenStore, Session, TokenStore};
