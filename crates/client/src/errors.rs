use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Local validation failed; the reason is also shown inline
    #[error("Rejected: {reason}")]
    Rejected { reason: String },

    #[error("Channel unavailable")]
    ChannelUnavailable,

    #[error(transparent)]
    Domain(#[from] domain::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
