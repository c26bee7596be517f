use std::sync::Arc;

use async_trait::async_trait;
use domain::Medication;
use tracing::debug;

use crate::errors::ClientError;
use crate::session::TokenStore;

/// Source of the logged-in patient's own medication list
#[async_trait]
pub trait MedicationLookup: Send + Sync {
    async fn patient_medications(&self) -> Result<Vec<Medication>, ClientError>;
}

/// `GET {api_url}/medications` with the session's bearer token
pub struct HttpMedicationLookup {
    http: reqwest::Client,
    api_url: String,
    store: Arc<dyn TokenStore>,
}

impl HttpMedicationLookup {
    pub fn new(api_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            store,
        }
    }
}

#[async_trait]
impl MedicationLookup for HttpMedicationLookup {
    async fn patient_medications(&self) -> Result<Vec<Medication>, ClientError> {
        let url = format!("{}/medications", self.api_url);
        let mut request = self.http.get(&url);
        if let Some(token) = self.store.token() {
            request = request.bearer_auth(token);
        }

        let medications: Vec<Medication> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Loaded {} medications from {}", medications.len(), url);
        Ok(medications)
    }
}
