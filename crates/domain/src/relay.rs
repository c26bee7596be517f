//! Relay routing contract.
//!
//! The production relay lives server-side. `Dispatcher` captures the
//! routing both client roles depend on so it can back local relays and
//! tests:
//!
//! - a patient request goes to every pharmacy client, enriched with the
//!   patient's name and phone and the drug name, and is acknowledged
//!   back to the patient
//! - a pharmacy response goes back to the originating patient
//! - once handled (or withdrawn) the other pharmacy clients are told to
//!   close their view of it

use std::collections::HashMap;

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::identity::{Claims, Role};
use crate::messages::{
    AttentionRequest, AttentionResponse, CancelRequest, Message, PopupClosed, PopupReply,
    PopupShown, RequestAck,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PatientProfile {
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Lookups the relay needs to enrich a request
pub trait Directory: Send + Sync {
    fn patient(&self, patient_id: &str) -> Option<PatientProfile>;
    fn drug_name(&self, drug_id: &str) -> Option<String>;
}

/// Directory loaded from a fixture file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StaticDirectory {
    #[serde(default)]
    pub patients: HashMap<String, PatientProfile>,
    #[serde(default)]
    pub drugs: HashMap<String, String>,
}

impl Directory for StaticDirectory {
    fn patient(&self, patient_id: &str) -> Option<PatientProfile> {
        self.patients.get(patient_id).cloned()
    }

    fn drug_name(&self, drug_id: &str) -> Option<String> {
        self.drugs.get(drug_id).cloned()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Recipient {
    User(String),
    Pharmacies,
    PharmaciesExcept(String),
}

#[derive(Clone, Debug, PartialEq, new)]
pub struct Delivery {
    pub recipient: Recipient,
    pub message: Message,
}

/// Outstanding requests, one per patient
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<String, AttentionRequest>,
}

impl Dispatcher {
    pub fn pending(&self, patient_id: &str) -> Option<&AttentionRequest> {
        self.pending.get(patient_id)
    }

    pub fn dispatch(
        &mut self,
        sender: &Claims,
        message: Message,
        directory: &dyn Directory,
    ) -> Result<Vec<Delivery>, Error> {
        match message {
            Message::PatientPopupRequest(request) => self.request(sender, request, directory),
            Message::PatientPopupCancel(cancel) => self.cancel(sender, cancel),
            Message::PharmacistPopupResponse(response) => self.respond(sender, response),
            _ => Err(Error::Forbidden),
        }
    }

    fn request(
        &mut self,
        sender: &Claims,
        request: AttentionRequest,
        directory: &dyn Directory,
    ) -> Result<Vec<Delivery>, Error> {
        if sender.user_type != Role::Patient || request.user_id != sender.id {
            return Err(Error::Forbidden);
        }

        let drug_name = directory
            .drug_name(&request.drug_id)
            .ok_or_else(|| Error::NotFound {
                entity: format!("drug {}", request.drug_id),
            })?;
        let profile = directory
            .patient(&sender.id)
            .unwrap_or_else(|| PatientProfile {
                name: sender.display_name(),
                phone: String::new(),
            });

        let mut deliveries = Vec::new();

        // A newer request from the same patient supersedes the old one.
        if let Some(previous) = self.pending.remove(&sender.id) {
            deliveries.push(Delivery::new(
                Recipient::Pharmacies,
                Message::ClosePopup(PopupClosed {
                    patient_id: sender.id.clone(),
                    request_id: previous.request_id,
                }),
            ));
        }

        deliveries.push(Delivery::new(
            Recipient::Pharmacies,
            Message::ShowPopup(PopupShown {
                request_id: request.request_id.clone(),
                patient_id: sender.id.clone(),
                user_name: profile.name,
                user_phone: profile.phone,
                drug_id: request.drug_id.clone(),
                drug_name,
                note: request.note.clone(),
            }),
        ));

        if let Some(request_id) = &request.request_id {
            deliveries.push(Delivery::new(
                Recipient::User(sender.id.clone()),
                Message::PopupRequestAck(RequestAck {
                    request_id: request_id.clone(),
                }),
            ));
        }

        self.pending.insert(sender.id.clone(), request);
        Ok(deliveries)
    }

    fn cancel(&mut self, sender: &Claims, cancel: CancelRequest) -> Result<Vec<Delivery>, Error> {
        if sender.user_type != Role::Patient {
            return Err(Error::Forbidden);
        }

        let Some(pending) = self.pending.get(&sender.id) else {
            return Ok(vec![]);
        };
        if let (Some(cancelled), Some(current)) = (&cancel.request_id, &pending.request_id) {
            if cancelled != current {
                return Err(Error::StaleResponse {
                    request_id: cancelled.clone(),
                });
            }
        }

        let request_id = self
            .pending
            .remove(&sender.id)
            .and_then(|pending| pending.request_id);

        Ok(vec![Delivery::new(
            Recipient::Pharmacies,
            Message::ClosePopup(PopupClosed {
                patient_id: sender.id.clone(),
                request_id,
            }),
        )])
    }

    fn respond(
        &mut self,
        sender: &Claims,
        response: AttentionResponse,
    ) -> Result<Vec<Delivery>, Error> {
        if sender.user_type != Role::Pharmacy {
            return Err(Error::Forbidden);
        }

        let pending = self
            .pending
            .get(&response.patient_id)
            .ok_or_else(|| Error::NotFound {
                entity: format!("pending request for {}", response.patient_id),
            })?;
        if let (Some(answered), Some(current)) = (&response.request_id, &pending.request_id) {
            if answered != current {
                return Err(Error::StaleResponse {
                    request_id: answered.clone(),
                });
            }
        }

        let request_id = self
            .pending
            .remove(&response.patient_id)
            .and_then(|pending| pending.request_id);

        Ok(vec![
            Delivery::new(
                Recipient::User(response.patient_id.clone()),
                Message::PopupResponse(PopupReply {
                    response: response.response,
                    price: Some(response.price),
                    request_id: request_id.clone(),
                }),
            ),
            Delivery::new(
                Recipient::PharmaciesExcept(sender.id.clone()),
                Message::ClosePopup(PopupClosed {
                    patient_id: response.patient_id,
                    request_id,
                }),
            ),
        ])
    }

    /// Forgets the pending request of a patient who went away and closes
    /// it on the pharmacy side
    pub fn abandon(&mut self, patient_id: &str) -> Vec<Delivery> {
        let Some(pending) = self.pending.remove(patient_id) else {
            return vec![];
        };

        vec![Delivery::new(
            Recipient::Pharmacies,
            Message::ClosePopup(PopupClosed {
                patient_id: patient_id.to_string(),
                request_id: pending.request_id,
            }),
        )]
    }
}
