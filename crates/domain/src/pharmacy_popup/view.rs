use serde::Serialize;

use super::PharmacyPopup;

/// Render model for the pharmacy modal. Every requester field comes from
/// the relay's `show_popup` payload.
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub struct RequestCard {
    pub patient_name: String,
    pub patient_phone: String,
    pub drug_name: String,
    pub note: String,
    pub message: String,
    pub price: String,
    pub error: Option<String>,
}

impl RequestCard {
    /// `None` when the modal is closed
    pub fn from_popup(popup: &PharmacyPopup) -> Option<Self> {
        let request = popup.request.as_ref()?;

        Some(Self {
            patient_name: request.user_name.clone(),
            patient_phone: request.user_phone.clone(),
            drug_name: request.drug_name.clone(),
            note: request.note.clone(),
            message: popup.message.clone(),
            price: popup.price.clone(),
            error: popup.error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::PopupShown;

    #[test]
    fn test_card_mirrors_relay_payload() {
        let popup = PharmacyPopup {
            request: Some(PopupShown {
                request_id: None,
                patient_id: "u1".to_string(),
                user_name: "Ada Lovelace".to_string(),
                user_phone: "555-0100".to_string(),
                drug_id: "d1".to_string(),
                drug_name: "Advil".to_string(),
                note: "need refill".to_string(),
            }),
            ..Default::default()
        };

        let card = RequestCard::from_popup(&popup).unwrap();
        assert_eq!(card.patient_name, "Ada Lovelace");
        assert_eq!(card.patient_phone, "555-0100");
        assert_eq!(card.drug_name, "Advil");
        assert_eq!(card.note, "need refill");
    }

    #[test]
    fn test_closed_modal_has_no_card() {
        assert!(RequestCard::from_popup(&PharmacyPopup::default()).is_none());
    }
}
