use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Account type carried in the `userType` claim
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Pharmacy,
    Admin,
    #[serde(other)]
    Unknown,
}

/// Identity claims carried in the bearer token payload.
///
/// The token is only decoded here, never verified: the relay and the REST
/// API own signature checks.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    pub user_type: Role,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub exp: i64,
}

impl Claims {
    /// Decode the payload segment of a JWT
    pub fn decode(token: &str) -> Result<Self, Error> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(Error::InvalidCredential {
                    reason: "expected three token segments".to_string(),
                })
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::InvalidCredential {
                reason: format!("payload is not base64url: {}", e),
            })?;

        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidCredential {
            reason: format!("payload is not a claims object: {}", e),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}
