use serde::{Deserialize, Serialize};

use crate::medications::Medication;
use crate::messages::PopupReply;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Command {
    /// Open the popup for composing
    OpenRequest,

    /// Populate the drug selection (medication lookup result)
    LoadMedications {
        medications: Vec<Medication>,
    },

    /// Send the drafted request
    SubmitRequest {
        request_id: String,
        user_id: Option<String>,
        note: String,
        drug_id: Option<String>,
    },

    /// Relay confirmed it accepted the request
    AcknowledgeDelivery {
        request_id: String,
    },

    /// Request could not be emitted or was never acknowledged
    FailDelivery {
        request_id: String,
        reason: String,
    },

    /// Pharmacist's reply arrived over the channel
    ReceiveResponse {
        reply: PopupReply,
    },

    /// Close the popup and reset everything
    Close,
}
