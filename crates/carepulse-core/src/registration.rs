//! Account creation and patient registration.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    to_fields, unique_id, BackendError, BlobStore, DocumentStore, ListQuery, UserDirectory,
    CREATED_AT,
};
use crate::models::{IdentificationUpload, NewPatient, NewUser, Patient, PatientDocument, User};

/// Registration errors.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Account already exists: {0}")]
    Conflict(String),

    #[error("An error occurred while uploading the identification document: {0}")]
    Upload(#[source] BackendError),

    #[error("An error occurred while {context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: BackendError,
    },
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

const CREATING_USER: &str = "creating a new user";
const RETRIEVING_USER: &str = "retrieving the user details";
const CREATING_PATIENT: &str = "creating a new patient";
const RETRIEVING_PATIENT: &str = "retrieving the patient details";

/// What to do when an account with the same email or phone already exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Return the first existing account with the same email
    #[default]
    ReturnExisting,
    /// Report the conflict to the caller
    Fail,
}

/// Settings for [`Registrar`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationSettings {
    pub patient_collection_id: String,
    pub bucket_id: String,
    /// Backend endpoint used to build file view URLs
    pub endpoint: String,
    pub project_id: String,
    pub conflict_policy: ConflictPolicy,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            patient_collection_id: "patients".into(),
            bucket_id: "identification".into(),
            endpoint: "http://localhost/v1".into(),
            project_id: "local".into(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl RegistrationSettings {
    /// Public view URL of a stored file.
    pub fn file_view_url(&self, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint.trim_end_matches('/'),
            self.bucket_id,
            file_id,
            self.project_id
        )
    }
}

/// Validate account creation form data.
pub fn validate_new_user(user: &NewUser) -> RegistrationResult<()> {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    static PHONE: OnceLock<Regex> = OnceLock::new();

    let name_len = user.name.trim().chars().count();
    if name_len < 2 {
        return Err(RegistrationError::InvalidInput(
            "Name must be at least 2 characters.".into(),
        ));
    }
    if name_len > 50 {
        return Err(RegistrationError::InvalidInput(
            "Name must be at most 50 characters.".into(),
        ));
    }

    let email = EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    });
    if !email.is_match(&user.email) {
        return Err(RegistrationError::InvalidInput("Invalid email address.".into()));
    }

    let phone =
        PHONE.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern compiles"));
    if !phone.is_match(&user.phone) {
        return Err(RegistrationError::InvalidInput("Invalid phone number.".into()));
    }

    Ok(())
}

/// Creates accounts and patient records.
pub struct Registrar<'a, U: ?Sized, D: ?Sized, B: ?Sized> {
    users: &'a U,
    documents: &'a D,
    blobs: &'a B,
    settings: RegistrationSettings,
}

impl<'a, U, D, B> Registrar<'a, U, D, B>
where
    U: UserDirectory + ?Sized,
    D: DocumentStore + ?Sized,
    B: BlobStore + ?Sized,
{
    pub fn new(
        users: &'a U,
        documents: &'a D,
        blobs: &'a B,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            users,
            documents,
            blobs,
            settings,
        }
    }

    /// Create an account, applying the configured [`ConflictPolicy`].
    pub fn create_user(&self, user: &NewUser) -> RegistrationResult<User> {
        validate_new_user(user)?;

        match self.users.create_user(&unique_id(), user) {
            Ok(created) => {
                info!(user_id = %created.id, "User created");
                Ok(created)
            }
            Err(BackendError::Conflict(what)) => match self.settings.conflict_policy {
                ConflictPolicy::Fail => Err(RegistrationError::Conflict(what)),
                ConflictPolicy::ReturnExisting => {
                    let existing = self
                        .users
                        .find_users_by_email(&user.email)
                        .map_err(|source| RegistrationError::Persistence {
                            context: CREATING_USER,
                            source,
                        })?;
                    match existing.into_iter().next() {
                        Some(found) => {
                            debug!(user_id = %found.id, "Returning existing account");
                            Ok(found)
                        }
                        // Conflict was on the phone number alone
                        None => Err(RegistrationError::Conflict(what)),
                    }
                }
            },
            Err(source) => Err(RegistrationError::Persistence {
                context: CREATING_USER,
                source,
            }),
        }
    }

    /// Get an account by id.
    pub fn get_user(&self, user_id: &str) -> RegistrationResult<User> {
        self.users.get_user(user_id).map_err(|e| match e {
            BackendError::NotFound(_) => RegistrationError::NotFound(format!("user {}", user_id)),
            source => RegistrationError::Persistence {
                context: RETRIEVING_USER,
                source,
            },
        })
    }

    /// Store the identification document (if any), then the patient record.
    ///
    /// A failed upload aborts before the patient record is written.
    pub fn register_patient(
        &self,
        patient: &NewPatient,
        identification: Option<&IdentificationUpload>,
    ) -> RegistrationResult<Patient> {
        let stored = match identification {
            Some(upload) => {
                let file = self
                    .blobs
                    .put_file(
                        &self.settings.bucket_id,
                        &unique_id(),
                        &upload.bytes,
                        &upload.file_name,
                    )
                    .map_err(|e| {
                        warn!(
                            user_id = %patient.user_id,
                            error = %e,
                            "Identification upload failed"
                        );
                        RegistrationError::Upload(e)
                    })?;
                Some(file)
            }
            None => None,
        };

        let url = stored.as_ref().map(|file| self.settings.file_view_url(&file.id));
        let document = PatientDocument {
            identification_document_id: stored.as_ref().map(|file| file.id.as_str()),
            identification_document_url: url.as_deref(),
            patient,
        };
        let fields = to_fields(&document).map_err(|e| RegistrationError::Persistence {
            context: CREATING_PATIENT,
            source: e.into(),
        })?;

        let created = self
            .documents
            .create_document(&self.settings.patient_collection_id, &unique_id(), fields)
            .map_err(|source| RegistrationError::Persistence {
                context: CREATING_PATIENT,
                source,
            })?;
        let patient: Patient = created.decode().map_err(|e| RegistrationError::Persistence {
            context: CREATING_PATIENT,
            source: e.into(),
        })?;

        info!(
            patient_id = %patient.id,
            user_id = %patient.user_id,
            has_document = patient.has_identification_document(),
            "Patient registered"
        );
        Ok(patient)
    }

    /// The patient record owned by an account (oldest first if several).
    pub fn get_patient(&self, user_id: &str) -> RegistrationResult<Patient> {
        let list = self
            .documents
            .list_documents(
                &self.settings.patient_collection_id,
                &ListQuery::new().equal("userId", user_id).order_asc(CREATED_AT).limit(1),
            )
            .map_err(|source| RegistrationError::Persistence {
                context: RETRIEVING_PATIENT,
                source,
            })?;

        let document = list
            .documents
            .into_iter()
            .next()
            .ok_or_else(|| RegistrationError::NotFound(format!("patient for user {}", user_id)))?;
        document.decode().map_err(|e| RegistrationError::Persistence {
            context: RETRIEVING_PATIENT,
            source: e.into(),
        })
    }
}
