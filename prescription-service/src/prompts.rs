//! Prompts sent to the generative model.

/// Reads a doctor's prescription image and asks for the JSON shape of
/// [`crate::models::Prescription`].
pub const READ_DOCTOR_PRESCRIPTION_V1: &str = r#"You are given an image of a doctor's prescription.
Read every medicine written on it together with its dosage, and infer the most probable causes (illnesses or conditions) the prescription is treating.
Estimate how fatal the combination of those causes is on a scale from 0 (harmless) to 10 (life threatening).

Respond with a single JSON object and nothing else, using exactly this shape:
{
  "medicine": [ { "name": "<medicine name>", "dosage": "<dosage as written, or null if not stated>" } ],
  "causes": [ "<probable cause>" ],
  "fatality": <integer from 0 to 10>
}

If the image is not a prescription or cannot be read, respond with:
{ "medicine": [], "causes": [], "fatality": -1 }"#;
