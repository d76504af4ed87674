//! Patient models.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}

/// Patient registration form data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    /// Owning account
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: DateTime<Utc>,
    pub gender: Gender,
    pub address: String,
    pub occupation: Option<String>,
    pub emergency_contact_name: String,
    pub emergency_contact_number: String,
    /// Preferred doctor from the roster
    pub primary_physician: String,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
    pub allergies: Option<String>,
    pub current_medication: Option<String>,
    pub family_medical_history: Option<String>,
    pub past_medical_history: Option<String>,
    /// Kind of identification (passport, driver's license, ...)
    pub identification_type: Option<String>,
    pub identification_number: Option<String>,
    pub privacy_consent: bool,
    pub treatment_consent: bool,
    pub disclosure_consent: bool,
}

/// An identification document uploaded with the registration form.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Attributes written for a new patient document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PatientDocument<'a> {
    pub identification_document_id: Option<&'a str>,
    pub identification_document_url: Option<&'a str>,
    #[serde(flatten)]
    pub patient: &'a NewPatient,
}

/// A persisted patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: DateTime<Utc>,
    pub gender: Gender,
    pub address: String,
    #[serde(default)]
    pub occupation: Option<String>,
    pub emergency_contact_name: String,
    pub emergency_contact_number: String,
    pub primary_physician: String,
    #[serde(default)]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_policy_number: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub current_medication: Option<String>,
    #[serde(default)]
    pub family_medical_history: Option<String>,
    #[serde(default)]
    pub past_medical_history: Option<String>,
    #[serde(default)]
    pub identification_type: Option<String>,
    #[serde(default)]
    pub identification_number: Option<String>,
    /// File id in the identification bucket
    #[serde(default)]
    pub identification_document_id: Option<String>,
    /// View URL of the uploaded file
    #[serde(default)]
    pub identification_document_url: Option<String>,
    #[serde(default)]
    pub privacy_consent: bool,
    #[serde(default)]
    pub treatment_consent: bool,
    #[serde(default)]
    pub disclosure_consent: bool,
}

impl Patient {
    /// Check if an identification document was uploaded.
    pub fn has_identification_document(&self) -> bool {
        self.identification_document_id.is_some()
    }
}
