use serde::{Deserialize, Serialize};

use crate::messages::{PopupClosed, PopupShown};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Relay delivered a patient request
    ShowRequest {
        request: PopupShown,
    },

    /// Relay says the request was handled elsewhere or withdrawn
    WithdrawRequest {
        closed: PopupClosed,
    },

    /// Send the priced answer; price is the raw form input
    SubmitResponse {
        message: String,
        price: String,
    },

    /// Operator closed the modal
    Dismiss,
}
