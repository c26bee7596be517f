//! Attention Popup Domain Models

/// Domain errors
pub mod errors;

/// Bearer token identity claims
pub mod identity;

/// Patient medication list entries
pub mod medications;

/// Channel wire messages
pub mod messages;

/// Patient-side popup aggregate
pub mod patient_popup;

/// Pharmacy-side popup aggregate
pub mod pharmacy_popup;

/// Relay routing contract
pub mod relay;

pub use errors::Error;
pub use identity::{Claims, Role};
pub use medications::Medication;
pub use messages::Message;
