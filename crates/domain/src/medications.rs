use serde::{Deserialize, Serialize};

/// One entry of a patient's own medication list, as returned by the
/// medication lookup service. Only used to populate the drug selection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub drug_id: String,
    pub brand_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
}

impl Medication {
    pub fn new(drug_id: impl Into<String>, brand_name: impl Into<String>) -> Self {
        Self {
            drug_id: drug_id.into(),
            brand_name: brand_name.into(),
            generic_name: None,
            dosage: None,
        }
    }
}
