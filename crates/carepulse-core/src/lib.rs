//! CarePulse Core Library
//!
//! Patient registration and appointment booking over a hosted
//! backend-as-a-service (documents, file storage, users, messaging).
//!
//! # Architecture
//!
//! ```text
//! Patient form ──▶ Registrar ──▶ BlobStore (ID document) ──▶ DocumentStore (patient)
//!
//! Appointment form ──▶ AppointmentManager::create ──▶ [pending]
//!                                                        │
//!                                     Admin schedules / cancels
//!                                                        │
//!                                     ┌──────────────────▼──────────────────┐
//!                                     │  AppointmentManager::update          │
//!                                     │  1. check transition table           │
//!                                     │  2. replace fields in DocumentStore  │
//!                                     │  3. compose message by kind          │
//!                                     │  4. MessagingSender::send_text       │
//!                                     └──────────────────┬──────────────────┘
//!                                                        │
//!                                           Admin dashboard (counts)
//! ```
//!
//! # Modules
//!
//! - [`backend`]: Collaborator contracts (document store, blob store, messaging, users)
//! - [`db`]: SQLite implementation of every contract
//! - [`models`]: Domain types (Appointment, Patient, User, Doctor)
//! - [`lifecycle`]: Appointment state transitions and notifications
//! - [`registration`]: Account creation and patient registration
//! - [`config`]: Backend configuration

pub mod backend;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod models;
pub mod registration;

// Re-export commonly used types
pub use backend::{BackendError, BlobStore, DocumentStore, MessagingSender, UserDirectory};
pub use config::BackendConfig;
pub use db::Database;
pub use lifecycle::{
    AppointmentManager, LifecycleError, LifecycleSettings, Notification, Notifier,
    TransitionPolicy,
};
pub use models::{
    Appointment, AppointmentStatus, AppointmentUpdate, CancelUpdate, NewAppointment, NewPatient,
    NewUser, Patient, RecentAppointments, ReplacementFields, ScheduleUpdate, StatusCounts,
    TransitionKind, User,
};
pub use registration::{ConflictPolicy, Registrar, RegistrationError, RegistrationSettings};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing_subscriber::EnvFilter;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CarePulseError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for CarePulseError {
    fn from(e: db::DbError) -> Self {
        CarePulseError::DatabaseError(e.to_string())
    }
}

impl From<LifecycleError> for CarePulseError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(id) => CarePulseError::NotFound(id),
            LifecycleError::InvalidInput(_) | LifecycleError::InvalidTransition { .. } => {
                CarePulseError::InvalidInput(e.to_string())
            }
            LifecycleError::Persistence { .. } => CarePulseError::DatabaseError(e.to_string()),
            LifecycleError::Notification { .. } => CarePulseError::NotificationError(e.to_string()),
        }
    }
}

impl From<RegistrationError> for CarePulseError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::NotFound(what) => CarePulseError::NotFound(what),
            RegistrationError::InvalidInput(what) => CarePulseError::InvalidInput(what),
            RegistrationError::Conflict(what) => CarePulseError::Conflict(what),
            RegistrationError::Upload(_) | RegistrationError::Persistence { .. } => {
                CarePulseError::DatabaseError(e.to_string())
            }
        }
    }
}

impl From<config::ConfigError> for CarePulseError {
    fn from(e: config::ConfigError) -> Self {
        CarePulseError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CarePulseError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CarePulseError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install the log subscriber. Filter comes from `RUST_LOG`; repeated calls are no-ops.
#[uniffi::export]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Open or create a database at the given path with local defaults.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<CarePulseCore>, CarePulseError> {
    let db = Database::open(&path)?;
    CarePulseCore::new(db, BackendConfig::default())
}

/// Open or create a database, configured from a JSON document.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config_json: String,
) -> Result<Arc<CarePulseCore>, CarePulseError> {
    let config = BackendConfig::from_json_str(&config_json)?;
    let db = Database::open(&path)?;
    CarePulseCore::new(db, config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<CarePulseCore>, CarePulseError> {
    let db = Database::open_in_memory()?;
    CarePulseCore::new(db, BackendConfig::default())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct CarePulseCore {
    db: Arc<Mutex<Database>>,
    lifecycle: LifecycleSettings,
    registration: RegistrationSettings,
}

impl CarePulseCore {
    fn new(db: Database, config: BackendConfig) -> Result<Arc<Self>, CarePulseError> {
        tracing::info!("{} core v{} opened", config::APP_NAME, config::APP_VERSION);
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            lifecycle: config.lifecycle_settings()?,
            registration: config.registration_settings(),
        }))
    }
}

#[uniffi::export]
impl CarePulseCore {
    // =========================================================================
    // User & Patient Operations
    // =========================================================================

    /// Create an account (or return the existing one, per conflict policy).
    pub fn create_user(
        &self,
        name: String,
        email: String,
        phone: String,
    ) -> Result<FfiUser, CarePulseError> {
        let db = self.db.lock()?;
        let registrar = Registrar::new(&*db, &*db, &*db, self.registration.clone());
        let user = registrar.create_user(&NewUser { name, email, phone })?;
        Ok(user.into())
    }

    /// Get an account by id.
    pub fn get_user(&self, user_id: String) -> Result<FfiUser, CarePulseError> {
        let db = self.db.lock()?;
        let registrar = Registrar::new(&*db, &*db, &*db, self.registration.clone());
        Ok(registrar.get_user(&user_id)?.into())
    }

    /// Register a patient, uploading the identification document first if given.
    pub fn register_patient(
        &self,
        patient: FfiNewPatient,
        document_name: Option<String>,
        document_bytes: Option<Vec<u8>>,
    ) -> Result<FfiPatient, CarePulseError> {
        let new_patient = NewPatient::try_from(patient)?;
        let upload = match (document_name, document_bytes) {
            (Some(file_name), Some(bytes)) => {
                Some(models::IdentificationUpload { file_name, bytes })
            }
            (None, None) => None,
            _ => {
                return Err(CarePulseError::InvalidInput(
                    "document name and bytes must be given together".into(),
                ))
            }
        };

        let db = self.db.lock()?;
        let registrar = Registrar::new(&*db, &*db, &*db, self.registration.clone());
        let registered = registrar.register_patient(&new_patient, upload.as_ref())?;
        Ok(registered.into())
    }

    /// Get the patient record owned by an account.
    pub fn get_patient(&self, user_id: String) -> Result<FfiPatient, CarePulseError> {
        let db = self.db.lock()?;
        let registrar = Registrar::new(&*db, &*db, &*db, self.registration.clone());
        Ok(registrar.get_patient(&user_id)?.into())
    }

    /// The bookable doctors.
    pub fn list_doctors(&self) -> Vec<FfiDoctor> {
        models::DOCTORS
            .iter()
            .map(|doctor| FfiDoctor {
                name: doctor.name.to_string(),
                image: doctor.image.to_string(),
            })
            .collect()
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    /// Request a new (pending) appointment.
    pub fn create_appointment(
        &self,
        request: FfiNewAppointment,
    ) -> Result<FfiAppointment, CarePulseError> {
        let new = NewAppointment {
            user_id: request.user_id,
            patient: request.patient_id,
            primary_physician: request.primary_physician,
            reason: request.reason,
            note: request.note,
            schedule: parse_date_time(&request.schedule)?,
        };

        let db = self.db.lock()?;
        let manager = AppointmentManager::new(&*db, &*db, self.lifecycle.clone());
        Ok(manager.create(&new)?.into())
    }

    /// Schedule, cancel or otherwise update an appointment and notify its owner.
    pub fn update_appointment(
        &self,
        appointment_id: String,
        kind: FfiTransitionKind,
        fields: FfiAppointmentFields,
    ) -> Result<FfiAppointment, CarePulseError> {
        let update = fields.into_update(kind)?;

        let db = self.db.lock()?;
        let manager = AppointmentManager::new(&*db, &*db, self.lifecycle.clone());
        Ok(manager.update(&appointment_id, update)?.into())
    }

    /// Get an appointment by id.
    pub fn get_appointment(
        &self,
        appointment_id: String,
    ) -> Result<FfiAppointment, CarePulseError> {
        let db = self.db.lock()?;
        let manager = AppointmentManager::new(&*db, &*db, self.lifecycle.clone());
        Ok(manager.get(&appointment_id)?.into())
    }

    /// All appointments, newest first, with per-status counts.
    pub fn list_recent_appointments(&self) -> Result<FfiAppointmentList, CarePulseError> {
        let db = self.db.lock()?;
        let manager = AppointmentManager::new(&*db, &*db, self.lifecycle.clone());
        Ok(manager.list_recent_with_counts()?.into())
    }
}

fn parse_date_time(raw: &str) -> Result<DateTime<Utc>, CarePulseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CarePulseError::InvalidInput(format!("invalid date-time {}: {}", raw, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
        }
    }
}

/// FFI-safe doctor roster entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDoctor {
    pub name: String,
    pub image: String,
}

/// FFI-safe patient registration form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// RFC 3339
    pub birth_date: String,
    /// "Male", "Female" or "Other"
    pub gender: String,
    pub address: String,
    pub occupation: Option<String>,
    pub emergency_contact_name: String,
    pub emergency_contact_number: String,
    pub primary_physician: String,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
    pub allergies: Option<String>,
    pub current_medication: Option<String>,
    pub family_medical_history: Option<String>,
    pub past_medical_history: Option<String>,
    pub identification_type: Option<String>,
    pub identification_number: Option<String>,
    pub privacy_consent: bool,
    pub treatment_consent: bool,
    pub disclosure_consent: bool,
}

impl TryFrom<FfiNewPatient> for NewPatient {
    type Error = CarePulseError;

    fn try_from(form: FfiNewPatient) -> Result<Self, Self::Error> {
        Ok(NewPatient {
            birth_date: parse_date_time(&form.birth_date)?,
            gender: form.gender.parse().map_err(CarePulseError::InvalidInput)?,
            user_id: form.user_id,
            name: form.name,
            email: form.email,
            phone: form.phone,
            address: form.address,
            occupation: form.occupation,
            emergency_contact_name: form.emergency_contact_name,
            emergency_contact_number: form.emergency_contact_number,
            primary_physician: form.primary_physician,
            insurance_provider: form.insurance_provider,
            insurance_policy_number: form.insurance_policy_number,
            allergies: form.allergies,
            current_medication: form.current_medication,
            family_medical_history: form.family_medical_history,
            past_medical_history: form.past_medical_history,
            identification_type: form.identification_type,
            identification_number: form.identification_number,
            privacy_consent: form.privacy_consent,
            treatment_consent: form.treatment_consent,
            disclosure_consent: form.disclosure_consent,
        })
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub birth_date: String,
    pub gender: String,
    pub address: String,
    pub primary_physician: String,
    pub identification_document_id: Option<String>,
    pub identification_document_url: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            birth_date: patient.birth_date.to_rfc3339(),
            gender: patient.gender.as_str().to_string(),
            id: patient.id,
            user_id: patient.user_id,
            name: patient.name,
            email: patient.email,
            phone: patient.phone,
            address: patient.address,
            primary_physician: patient.primary_physician,
            identification_document_id: patient.identification_document_id,
            identification_document_url: patient.identification_document_url,
        }
    }
}

/// FFI-safe appointment request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewAppointment {
    pub user_id: String,
    pub patient_id: String,
    pub primary_physician: String,
    pub reason: String,
    pub note: Option<String>,
    /// RFC 3339
    pub schedule: String,
}

/// FFI-safe transition kind.
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiTransitionKind {
    Schedule,
    Cancel,
    Other,
}

/// FFI-safe replacement fields for an update.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentFields {
    pub primary_physician: String,
    /// RFC 3339
    pub schedule: String,
    pub reason: String,
    pub note: Option<String>,
    /// Required for `Other`, ignored otherwise
    pub status: Option<String>,
    /// Only used by `Cancel` and `Other`
    pub cancellation_reason: Option<String>,
}

impl FfiAppointmentFields {
    fn into_update(self, kind: FfiTransitionKind) -> Result<AppointmentUpdate, CarePulseError> {
        let schedule = parse_date_time(&self.schedule)?;
        Ok(match kind {
            FfiTransitionKind::Schedule => AppointmentUpdate::Schedule(ScheduleUpdate {
                primary_physician: self.primary_physician,
                schedule,
                reason: self.reason,
                note: self.note,
            }),
            FfiTransitionKind::Cancel => AppointmentUpdate::Cancel(CancelUpdate {
                primary_physician: self.primary_physician,
                schedule,
                reason: self.reason,
                note: self.note,
                cancellation_reason: self.cancellation_reason,
            }),
            FfiTransitionKind::Other => {
                let status = self
                    .status
                    .ok_or_else(|| CarePulseError::InvalidInput("status is required".into()))?
                    .parse()
                    .map_err(CarePulseError::InvalidInput)?;
                AppointmentUpdate::Other(ReplacementFields {
                    primary_physician: self.primary_physician,
                    reason: self.reason,
                    note: self.note,
                    schedule,
                    status,
                    cancellation_reason: self.cancellation_reason,
                })
            }
        })
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub created_at: String,
    pub user_id: String,
    pub patient_id: String,
    pub primary_physician: String,
    pub reason: String,
    pub note: Option<String>,
    pub schedule: String,
    pub status: String,
    pub cancellation_reason: Option<String>,
}

impl From<Appointment> for FfiAppointment {
    fn from(appointment: Appointment) -> Self {
        Self {
            schedule: appointment.schedule.to_rfc3339(),
            status: appointment.status.to_string(),
            id: appointment.id,
            created_at: appointment.created_at,
            user_id: appointment.user_id,
            patient_id: appointment.patient,
            primary_physician: appointment.primary_physician,
            reason: appointment.reason,
            note: appointment.note,
            cancellation_reason: appointment.cancellation_reason,
        }
    }
}

/// FFI-safe dashboard listing.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentList {
    pub total: u64,
    pub scheduled_count: u64,
    pub pending_count: u64,
    pub cancelled_count: u64,
    pub appointments: Vec<FfiAppointment>,
}

impl From<RecentAppointments> for FfiAppointmentList {
    fn from(recent: RecentAppointments) -> Self {
        Self {
            total: recent.total,
            scheduled_count: recent.counts.scheduled_count,
            pending_count: recent.counts.pending_count,
            cancelled_count: recent.counts.cancelled_count,
            appointments: recent.appointments.into_iter().map(|a| a.into()).collect(),
        }
    }
}
