use serde::{Deserialize, Serialize};

/// A single medicine read off the prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medicine {
    pub name: String,
    /// Serialized as `null` when the prescription does not state one.
    #[serde(default)]
    pub dosage: Option<String>,
}

/// Structured extraction returned by `POST /api/v1/drugs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(rename = "medicine", default)]
    pub medicines: Vec<Medicine>,
    #[serde(default)]
    pub causes: Vec<String>,
    pub fatality: i32,
}

impl Prescription {
    /// Fatality value meaning "could not be determined".
    pub const UNDETERMINED_FATALITY: i32 = -1;

    /// Placeholder returned when the model output cannot be decoded.
    pub fn undetermined() -> Self {
        Self {
            medicines: Vec::new(),
            causes: Vec::new(),
            fatality: Self::UNDETERMINED_FATALITY,
        }
    }

    /// Decode the model's raw text into a prescription.
    pub fn from_model_output(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw.trim())
    }
}
