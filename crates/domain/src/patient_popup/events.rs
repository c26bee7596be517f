use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::medications::Medication;
use crate::messages::AttentionRequest;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    RequestOpened,

    MedicationsLoaded {
        medications: Vec<Medication>,
    },

    SubmissionRejected {
        note: String,
        drug_id: Option<String>,
        reason: String,
    },

    RequestSent {
        request: AttentionRequest,
    },

    DeliveryAcknowledged {
        request_id: String,
    },

    DeliveryFailed {
        request_id: String,
        reason: String,
    },

    ResponseReceived {
        request_id: Option<String>,
        response: String,
        price: Option<f64>,
    },

    RequestClosed,
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        match self {
            Event::RequestOpened => "PatientPopup:Opened".to_string(),
            Event::MedicationsLoaded { .. } => "PatientPopup:MedicationsLoaded".to_string(),
            Event::SubmissionRejected { .. } => "PatientPopup:SubmissionRejected".to_string(),
            Event::RequestSent { .. } => "PatientPopup:RequestSent".to_string(),
            Event::DeliveryAcknowledged { .. } => "PatientPopup:DeliveryAcknowledged".to_string(),
            Event::DeliveryFailed { .. } => "PatientPopup:DeliveryFailed".to_string(),
            Event::ResponseReceived { .. } => "PatientPopup:ResponseReceived".to_string(),
            Event::RequestClosed => "PatientPopup:Closed".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1.0".to_string()
    }
}
