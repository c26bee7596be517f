use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::medications::Medication;
use crate::messages::{AttentionRequest, PopupReply};

use super::{Command, Event};

pub const MSG_NOT_LOGGED_IN: &str = "You must be logged in to request a drug.";
pub const MSG_EMPTY_NOTE: &str = "Please enter a note for the pharmacist.";
pub const MSG_NO_MEDICATION: &str = "Please select a medication.";

/// What the patient's popup is showing
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PopupViewState {
    /// Popup hidden
    #[default]
    Closed,
    /// Drafting a note and picking a medication
    Composing,
    /// Request emitted, no reply yet
    AwaitingResponse,
    /// Pharmacist reply on screen
    ResponseReceived,
    /// Request could not be delivered to the relay
    DeliveryFailed,
}

impl PopupViewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupViewState::Closed => "closed",
            PopupViewState::Composing => "composing",
            PopupViewState::AwaitingResponse => "awaiting_response",
            PopupViewState::ResponseReceived => "response_received",
            PopupViewState::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Patient-side attention popup
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientPopup {
    pub state: PopupViewState,
    pub medications: Vec<Medication>,

    // Draft
    pub note: String,
    pub selected_drug_id: Option<String>,
    pub error: Option<String>,

    // Delivery
    pub sent: bool,
    pub outstanding: Option<AttentionRequest>,
    pub acknowledged: bool,

    // Reply
    pub response: Option<String>,
    pub price: Option<f64>,
}

pub const AGGREGATE_TYPE: &str = "PatientPopup";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for PatientPopup {
    type Command = Command;
    type Event = Event;
    type Error = Error;
    type Services = Services;

    fn aggregate_type() -> String {
        AGGREGATE_TYPE.to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            Command::OpenRequest => {
                if self.state != PopupViewState::Closed {
                    return Ok(vec![]);
                }
                Ok(vec![Event::RequestOpened])
            }

            Command::LoadMedications { medications } => {
                // A lookup that finishes after the popup closed is dropped.
                if self.state == PopupViewState::Closed {
                    return Ok(vec![]);
                }
                Ok(vec![Event::MedicationsLoaded { medications }])
            }

            Command::SubmitRequest {
                request_id,
                user_id,
                note,
                drug_id,
            } => {
                self.validate_can_submit()?;

                let drug_id = drug_id.filter(|id| !id.trim().is_empty());
                match (user_id, drug_id) {
                    (None, drug_id) => Ok(rejected(note, drug_id, MSG_NOT_LOGGED_IN)),
                    (Some(_), drug_id) if note.trim().is_empty() => {
                        Ok(rejected(note, drug_id, MSG_EMPTY_NOTE))
                    }
                    (Some(_), None) => Ok(rejected(note, None, MSG_NO_MEDICATION)),
                    (Some(user_id), Some(drug_id)) => Ok(vec![Event::RequestSent {
                        request: AttentionRequest {
                            request_id: Some(request_id),
                            user_id,
                            drug_id,
                            note,
                        },
                    }]),
                }
            }

            Command::AcknowledgeDelivery { request_id } => {
                self.validate_outstanding(&request_id)?;
                if self.acknowledged {
                    return Ok(vec![]);
                }
                Ok(vec![Event::DeliveryAcknowledged { request_id }])
            }

            Command::FailDelivery { request_id, reason } => {
                self.validate_outstanding(&request_id)?;
                if self.acknowledged || self.state != PopupViewState::AwaitingResponse {
                    return Ok(vec![]);
                }
                Ok(vec![Event::DeliveryFailed { request_id, reason }])
            }

            Command::ReceiveResponse { reply } => {
                self.validate_reply(&reply)?;
                Ok(vec![Event::ResponseReceived {
                    request_id: reply.request_id,
                    response: reply.response,
                    price: reply.price,
                }])
            }

            Command::Close => Ok(vec![Event::RequestClosed]),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::RequestOpened => {
                self.state = PopupViewState::Composing;
            }

            Event::MedicationsLoaded { medications } => {
                self.medications = medications;
            }

            Event::SubmissionRejected {
                note,
                drug_id,
                reason,
            } => {
                self.note = note;
                self.selected_drug_id = drug_id;
                self.error = Some(reason);
            }

            Event::RequestSent { request } => {
                self.note = request.note.clone();
                self.selected_drug_id = Some(request.drug_id.clone());
                self.error = None;
                self.sent = true;
                self.acknowledged = false;
                self.response = None;
                self.price = None;
                self.outstanding = Some(request);
                self.state = PopupViewState::AwaitingResponse;
            }

            Event::DeliveryAcknowledged { .. } => {
                self.acknowledged = true;
                if self.state == PopupViewState::DeliveryFailed {
                    self.state = PopupViewState::AwaitingResponse;
                    self.error = None;
                }
            }

            Event::DeliveryFailed { reason, .. } => {
                self.state = PopupViewState::DeliveryFailed;
                self.error = Some(reason);
            }

            Event::ResponseReceived {
                response, price, ..
            } => {
                self.outstanding = None;
                self.response = Some(response);
                self.price = price;
                self.error = None;
                self.state = PopupViewState::ResponseReceived;
            }

            Event::RequestClosed => {
                *self = PatientPopup::default();
            }
        }
    }
}

fn rejected(note: String, drug_id: Option<String>, reason: &str) -> Vec<Event> {
    vec![Event::SubmissionRejected {
        note,
        drug_id,
        reason: reason.to_string(),
    }]
}

impl PatientPopup {
    /// The request id the popup is waiting on, if any
    pub fn outstanding_request_id(&self) -> Option<&str> {
        self.outstanding
            .as_ref()
            .and_then(|request| request.request_id.as_deref())
    }

    fn validate_can_submit(&self) -> Result<(), Error> {
        match self.state {
            PopupViewState::Composing | PopupViewState::DeliveryFailed => Ok(()),
            state => Err(Error::InvalidStateTransition {
                from: state.as_str().to_string(),
                to: PopupViewState::AwaitingResponse.as_str().to_string(),
            }),
        }
    }

    fn validate_outstanding(&self, request_id: &str) -> Result<(), Error> {
        match self.outstanding_request_id() {
            Some(outstanding) if outstanding == request_id => Ok(()),
            _ => Err(Error::StaleResponse {
                request_id: request_id.to_string(),
            }),
        }
    }

    /// Replies carrying an id must match the outstanding request. Replies
    /// without one are scoped by the channel alone.
    fn validate_reply(&self, reply: &PopupReply) -> Result<(), Error> {
        match &reply.request_id {
            Some(request_id) => self.validate_outstanding(request_id),
            None => Ok(()),
        }
    }
}
