use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::messages::{AttentionResponse, PopupClosed, PopupShown};

use super::{Command, Event};

pub const MSG_EMPTY_RESPONSE: &str = "Please enter a response for the patient.";
pub const MSG_EMPTY_PRICE: &str = "Please enter a price.";
pub const MSG_INVALID_PRICE: &str = "Price must be a number.";
pub const MSG_NEGATIVE_PRICE: &str = "Price cannot be negative.";

/// Pharmacy-side attention modal
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct PharmacyPopup {
    /// Request on screen, exactly as the relay delivered it
    pub request: Option<PopupShown>,

    // Response draft
    pub message: String,
    pub price: String,
    pub error: Option<String>,
}

pub const AGGREGATE_TYPE: &str = "PharmacyPopup";

#[derive(Clone, Default)]
pub struct Services {}

#[async_trait]
impl Aggregate for PharmacyPopup {
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
            Command::ShowRequest { request } => Ok(vec![Event::RequestShown { request }]),

            Command::WithdrawRequest { closed } => {
                if !self.is_showing(&closed) {
                    return Ok(vec![]);
                }
                Ok(vec![Event::RequestWithdrawn {
                    patient_id: closed.patient_id,
                }])
            }

            Command::SubmitResponse { message, price } => {
                let request = self.validate_open()?;

                match parse_price(&message, &price) {
                    Err(reason) => Ok(vec![Event::ResponseRejected {
                        message,
                        price,
                        reason: reason.to_string(),
                    }]),
                    Ok(amount) => Ok(vec![Event::ResponseSent {
                        response: AttentionResponse {
                            request_id: request.request_id.clone(),
                            patient_id: request.patient_id.clone(),
                            response: message,
                            price: amount,
                            drug_id: request.drug_id.clone(),
                            note: request.note.clone(),
                        },
                    }]),
                }
            }

            Command::Dismiss => {
                if self.request.is_none() {
                    return Ok(vec![]);
                }
                Ok(vec![Event::Dismissed])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            Event::RequestShown { request } => {
                *self = PharmacyPopup {
                    request: Some(request),
                    ..Default::default()
                };
            }

            Event::ResponseRejected {
                message,
                price,
                reason,
            } => {
                self.message = message;
                self.price = price;
                self.error = Some(reason);
            }

            Event::RequestWithdrawn { .. } | Event::ResponseSent { .. } | Event::Dismissed => {
                *self = PharmacyPopup::default();
            }
        }
    }
}

/// Validates the draft in form order: message, then price.
fn parse_price(message: &str, price: &str) -> Result<f64, &'static str> {
    if message.trim().is_empty() {
        return Err(MSG_EMPTY_RESPONSE);
    }
    if price.trim().is_empty() {
        return Err(MSG_EMPTY_PRICE);
    }
    let amount: f64 = price.trim().parse().map_err(|_| MSG_INVALID_PRICE)?;
    if !amount.is_finite() {
        return Err(MSG_INVALID_PRICE);
    }
    if amount < 0.0 {
        return Err(MSG_NEGATIVE_PRICE);
    }
    Ok(amount)
}

impl PharmacyPopup {
    pub fn is_open(&self) -> bool {
        self.request.is_some()
    }

    fn validate_open(&self) -> Result<&PopupShown, Error> {
        self.request.as_ref().ok_or_else(|| Error::NotFound {
            entity: "attention request".to_string(),
        })
    }

    fn is_showing(&self, closed: &PopupClosed) -> bool {
        let Some(request) = &self.request else {
            return false;
        };
        if request.patient_id != closed.patient_id {
            return false;
        }
        match (&request.request_id, &closed.request_id) {
            (Some(shown), Some(closing)) => shown == closing,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqrs_es::test::TestFramework;

    type PopupTestFramework = TestFramework<PharmacyPopup>;

    fn framework() -> PopupTestFramework {
        PopupTestFramework::with(Services::default())
    }

    fn shown() -> PopupShown {
        PopupShown {
            request_id: Some("r1".to_string()),
            patient_id: "u1".to_string(),
            user_name: "Ada Lovelace".to_string(),
            user_phone: "555-0100".to_string(),
            drug_id: "d1".to_string(),
            drug_name: "Advil".to_string(),
            note: "pain".to_string(),
        }
    }

    fn respond(message: &str, price: &str) -> Command {
        Command::SubmitResponse {
            message: message.to_string(),
            price: price.to_string(),
        }
    }

    fn closed(patient_id: &str, request_id: Option<&str>) -> PopupClosed {
        PopupClosed {
            patient_id: patient_id.to_string(),
            request_id: request_id.map(str::to_string),
        }
    }

    #[test]
    fn test_show_displays_relay_fields() {
        let mut popup = PharmacyPopup {
            message: "stale draft".to_string(),
            price: "9".to_string(),
            error: Some(MSG_INVALID_PRICE.to_string()),
            ..Default::default()
        };
        popup.apply(Event::RequestShown { request: shown() });

        assert!(popup.is_open());
        assert_eq!(popup.request, Some(shown()));
        assert!(popup.message.is_empty());
        assert!(popup.price.is_empty());
        assert!(popup.error.is_none());
    }

    #[test]
    fn test_valid_response_is_sent() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(respond("ready in 1 hr", "12.5"))
            .then_expect_events(vec![Event::ResponseSent {
                response: AttentionResponse {
                    request_id: Some("r1".to_string()),
                    patient_id: "u1".to_string(),
                    response: "ready in 1 hr".to_string(),
                    price: 12.5,
                    drug_id: "d1".to_string(),
                    note: "pain".to_string(),
                },
            }]);
    }

    #[test]
    fn test_non_numeric_prices_are_rejected() {
        for price in ["abc", "12,5", "NaN", "inf", "1e999", "$3"] {
            framework()
                .given(vec![Event::RequestShown { request: shown() }])
                .when(respond("ready in 1 hr", price))
                .then_expect_events(vec![Event::ResponseRejected {
                    message: "ready in 1 hr".to_string(),
                    price: price.to_string(),
                    reason: MSG_INVALID_PRICE.to_string(),
                }]);
        }
    }

    #[test]
    fn test_empty_fields_are_rejected() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(respond("ready", "  "))
            .then_expect_events(vec![Event::ResponseRejected {
                message: "ready".to_string(),
                price: "  ".to_string(),
                reason: MSG_EMPTY_PRICE.to_string(),
            }]);

        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(respond(" ", "12"))
            .then_expect_events(vec![Event::ResponseRejected {
                message: " ".to_string(),
                price: "12".to_string(),
                reason: MSG_EMPTY_RESPONSE.to_string(),
            }]);
    }

    #[test]
    fn test_negative_price_is_rejected() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(respond("ready", "-1"))
            .then_expect_events(vec![Event::ResponseRejected {
                message: "ready".to_string(),
                price: "-1".to_string(),
                reason: MSG_NEGATIVE_PRICE.to_string(),
            }]);
    }

    #[test]
    fn test_rejected_response_keeps_modal_open() {
        let mut popup = PharmacyPopup::default();
        popup.apply(Event::RequestShown { request: shown() });
        popup.apply(Event::ResponseRejected {
            message: "ready".to_string(),
            price: "abc".to_string(),
            reason: MSG_INVALID_PRICE.to_string(),
        });

        assert!(popup.is_open());
        assert_eq!(popup.price, "abc");
        assert_eq!(popup.error.as_deref(), Some(MSG_INVALID_PRICE));
    }

    #[test]
    fn test_respond_without_request() {
        framework()
            .given_no_previous_events()
            .when(respond("ready", "1"))
            .then_expect_error_message("Entity not found: attention request");
    }

    #[test]
    fn test_withdraw_matching_patient() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(Command::WithdrawRequest {
                closed: closed("u1", None),
            })
            .then_expect_events(vec![Event::RequestWithdrawn {
                patient_id: "u1".to_string(),
            }]);
    }

    #[test]
    fn test_withdraw_other_patient_is_ignored() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(Command::WithdrawRequest {
                closed: closed("u2", None),
            })
            .then_expect_events(vec![]);
    }

    #[test]
    fn test_withdraw_other_request_of_same_patient_is_ignored() {
        framework()
            .given(vec![Event::RequestShown { request: shown() }])
            .when(Command::WithdrawRequest {
                closed: closed("u1", Some("r0")),
            })
            .then_expect_events(vec![]);
    }

    #[test]
    fn test_sent_response_clears_modal() {
        let mut popup = PharmacyPopup::default();
        popup.apply(Event::RequestShown { request: shown() });
        popup.apply(Event::ResponseSent {
            response: AttentionResponse {
                request_id: Some("r1".to_string()),
                patient_id: "u1".to_string(),
                response: "ready".to_string(),
                price: 1.0,
                drug_id: "d1".to_string(),
                note: "pain".to_string(),
            },
        });

        assert_eq!(popup, PharmacyPopup::default());
    }

    #[test]
    fn test_dismiss_closed_modal_is_noop() {
        framework()
            .given_no_previous_events()
            .when(Command::Dismiss)
            .then_expect_events(vec![]);
    }
}
