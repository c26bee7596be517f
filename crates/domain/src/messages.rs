//! Channel frames exchanged between clients and the relay.
//!
//! Every frame is a JSON object `{"event": <name>, "data": {...}}`.

use serde::{Deserialize, Serialize};

/// Patient asks for a pharmacist's attention
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttentionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub user_id: String,
    pub drug_id: String,
    pub note: String,
}

/// Patient withdraws its outstanding request
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Pharmacist's priced answer to a request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttentionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub patient_id: String,
    pub response: String,
    pub price: f64,
    pub drug_id: String,
    pub note: String,
}

/// Request as delivered to a pharmacy client, enriched by the relay
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopupShown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub patient_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_phone: String,
    pub drug_id: String,
    #[serde(default)]
    pub drug_name: String,
    #[serde(default)]
    pub note: String,
}

/// Relay tells a pharmacy client to drop its view of a request
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopupClosed {
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Response as delivered back to the patient
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PopupReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Relay accepted a patient's request
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestAck {
    pub request_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Message {
    PatientPopupRequest(AttentionRequest),
    PatientPopupCancel(CancelRequest),
    PharmacistPopupResponse(AttentionResponse),
    ShowPopup(PopupShown),
    ClosePopup(PopupClosed),
    PopupResponse(PopupReply),
    PopupRequestAck(RequestAck),
}

impl Message {
    pub fn event_name(&self) -> &'static str {
        match self {
            Message::PatientPopupRequest(_) => "patient_popup_request",
            Message::PatientPopupCancel(_) => "patient_popup_cancel",
            Message::PharmacistPopupResponse(_) => "pharmacist_popup_response",
            Message::ShowPopup(_) => "show_popup",
            Message::ClosePopup(_) => "close_popup",
            Message::PopupResponse(_) => "popup_response",
            Message::PopupRequestAck(_) => "popup_request_ack",
        }
    }
}
