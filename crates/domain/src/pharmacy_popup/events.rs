use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::messages::{AttentionResponse, PopupShown};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    RequestShown {
        request: PopupShown,
    },

    RequestWithdrawn {
        patient_id: String,
    },

    ResponseRejected {
        message: String,
        price: String,
        reason: String,
    },

    ResponseSent {
        response: AttentionResponse,
    },

    Dismissed,
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::RequestShown { .. } => "PharmacyPopup:RequestShown".to_string(),
            Event::RequestWithdrawn { .. } => "PharmacyPopup:RequestWithdrawn".to_string(),
            Event::ResponseRejected { .. } => "PharmacyPopup:ResponseRejected".to_string(),
            Event::ResponseSent { .. } => "PharmacyPopup:ResponseSent".to_string(),
            Event::Dismissed => "PharmacyPopup:Dismissed".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
