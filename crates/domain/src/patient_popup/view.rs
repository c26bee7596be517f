use serde::Serialize;

use super::{PatientPopup, PopupViewState};

/// Medication choice shown in the drug selection
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub struct MedicationOption {
    pub drug_id: String,
    pub label: String,
    pub selected: bool,
}

/// Render model for the patient popup
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct RequestView {
    pub open: bool,
    pub state: PopupViewState,
    pub banner: Option<String>,
    pub error: Option<String>,
    pub show_form: bool,
    pub options: Vec<MedicationOption>,
}

impl From<&PatientPopup> for RequestView {
    fn from(popup: &PatientPopup) -> Self {
        let banner = match (popup.state, &popup.response) {
            (PopupViewState::ResponseReceived, Some(response)) => Some(match popup.price {
                Some(price) => format!("Pharmacist Response: {} (price: {:.2})", response, price),
                None => format!("Pharmacist Response: {}", response),
            }),
            (PopupViewState::AwaitingResponse, _) if popup.acknowledged => {
                Some("Request received! A pharmacist has been notified.".to_string())
            }
            (PopupViewState::AwaitingResponse, _) => {
                Some("Request sent! A pharmacist will be notified.".to_string())
            }
            _ => None,
        };

        let options = popup
            .medications
            .iter()
            .map(|medication| MedicationOption {
                drug_id: medication.drug_id.clone(),
                label: medication.brand_name.clone(),
                selected: popup.selected_drug_id.as_deref() == Some(medication.drug_id.as_str()),
            })
            .collect();

        Self {
            open: popup.state != PopupViewState::Closed,
            state: popup.state,
            banner,
            error: popup.error.clone(),
            show_form: matches!(
                popup.state,
                PopupViewState::Composing | PopupViewState::DeliveryFailed
            ),
            options,
        }
    }
}
