//! Appointment lifecycle manager.
//!
//! ```text
//! [pending] ──schedule──▶ [scheduled]
//!     │                       │
//!     └───────cancel──────────┴──cancel──▶ [cancelled]
//! ```
//!
//! Every successful update sends one SMS to the appointment's owner. The
//! store write and the SMS are independent remote calls: when the write
//! succeeds and the SMS fails, the caller gets
//! [`LifecycleError::Notification`] carrying the saved appointment.

mod notification;

pub use notification::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    to_fields, BackendError, Document, DocumentStore, ListQuery, MessagingSender, CREATED_AT,
};
use crate::models::{
    Appointment, AppointmentDocument, AppointmentStatus, AppointmentUpdate, NewAppointment,
    RecentAppointments, StatusCounts,
};

/// Lifecycle errors.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Appointment not found: {0}")]
    NotFound(String),

    #[error("Cannot move appointment {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("An error occurred while {context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: BackendError,
    },

    #[error(
        "An error occurred while sending sms notification for appointment {}: {}",
        .appointment.id,
        .source
    )]
    Notification {
        /// The appointment as saved before the send failed
        appointment: Box<Appointment>,
        #[source]
        source: BackendError,
    },
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

const CREATING: &str = "creating a new appointment";
const UPDATING: &str = "updating an appointment";
const RETRIEVING: &str = "retrieving the appointment details";
const LISTING: &str = "retrieving the recent appointments";

/// Whether updates are checked against the status transition table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Read the current status first and reject illegal transitions
    #[default]
    Enforce,
    /// Write whatever status the update carries
    Permissive,
}

/// Settings for [`AppointmentManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    pub collection_id: String,
    pub notifier: Notifier,
    pub transition_policy: TransitionPolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            collection_id: "appointments".into(),
            notifier: Notifier::default(),
            transition_policy: TransitionPolicy::default(),
        }
    }
}

/// Owns appointment state transitions and notification dispatch.
///
/// Stateless between calls; collaborators are injected at construction.
pub struct AppointmentManager<'a, S: ?Sized, M: ?Sized> {
    store: &'a S,
    messaging: &'a M,
    settings: LifecycleSettings,
}

impl<'a, S, M> AppointmentManager<'a, S, M>
where
    S: DocumentStore + ?Sized,
    M: MessagingSender + ?Sized,
{
    pub fn new(store: &'a S, messaging: &'a M, settings: LifecycleSettings) -> Self {
        Self {
            store,
            messaging,
            settings,
        }
    }

    /// Create a pending appointment.
    pub fn create(&self, new: &NewAppointment) -> LifecycleResult<Appointment> {
        if new.reason.trim().is_empty() {
            return Err(LifecycleError::InvalidInput(
                "reason must not be empty".into(),
            ));
        }

        let fields = to_fields(&AppointmentDocument::from(new))
            .map_err(|e| persistence(CREATING, e.into()))?;
        let id = crate::backend::unique_id();

        let document = self
            .store
            .create_document(&self.settings.collection_id, &id, fields)
            .map_err(|e| persistence(CREATING, e))?;
        let appointment = decode(&document, CREATING)?;

        info!(
            appointment_id = %appointment.id,
            user_id = %appointment.user_id,
            physician = %appointment.primary_physician,
            "Appointment requested"
        );
        Ok(appointment)
    }

    /// Apply an update, then notify the owner.
    pub fn update(
        &self,
        appointment_id: &str,
        update: AppointmentUpdate,
    ) -> LifecycleResult<Appointment> {
        let kind = update.kind();
        let target = update.target_status();
        debug!(appointment_id, %kind, %target, "Updating appointment");

        if self.settings.transition_policy == TransitionPolicy::Enforce {
            let current = self.fetch(appointment_id, UPDATING)?;
            if !current.status.can_transition_to(target) {
                warn!(
                    appointment_id,
                    from = %current.status,
                    to = %target,
                    "Rejected status transition"
                );
                return Err(LifecycleError::InvalidTransition {
                    id: appointment_id.to_string(),
                    from: current.status,
                    to: target,
                });
            }
        }

        let fields = to_fields(&update.into_fields()).map_err(|e| persistence(UPDATING, e.into()))?;
        let document = self
            .store
            .update_document(&self.settings.collection_id, appointment_id, fields)
            .map_err(|e| match e {
                BackendError::NotFound(_) => LifecycleError::NotFound(appointment_id.to_string()),
                other => persistence(UPDATING, other),
            })?;
        let appointment = decode(&document, UPDATING)?;

        let notification = self.settings.notifier.compose(kind, &appointment);
        if let Err(source) = self
            .messaging
            .send_text(&[notification.recipient_user_id.clone()], &notification.body)
        {
            warn!(appointment_id, error = %source, "Appointment saved but notification failed");
            return Err(LifecycleError::Notification {
                appointment: Box::new(appointment),
                source,
            });
        }

        info!(appointment_id, %kind, status = %appointment.status, "Appointment updated");
        Ok(appointment)
    }

    /// Get an appointment by id.
    pub fn get(&self, appointment_id: &str) -> LifecycleResult<Appointment> {
        self.fetch(appointment_id, RETRIEVING)
    }

    /// All appointments, most recent first, with per-status counts.
    pub fn list_recent_with_counts(&self) -> LifecycleResult<RecentAppointments> {
        let list = self
            .store
            .list_documents(
                &self.settings.collection_id,
                &ListQuery::new().order_desc(CREATED_AT),
            )
            .map_err(|e| persistence(LISTING, e))?;

        let appointments = list
            .documents
            .iter()
            .map(|document| decode(document, LISTING))
            .collect::<LifecycleResult<Vec<_>>>()?;
        let counts = StatusCounts::tally(&appointments);

        debug!(total = list.total, ?counts, "Listed recent appointments");
        Ok(RecentAppointments {
            total: list.total,
            appointments,
            counts,
        })
    }

    fn fetch(&self, appointment_id: &str, context: &'static str) -> LifecycleResult<Appointment> {
        let document = self
            .store
            .get_document(&self.settings.collection_id, appointment_id)
            .map_err(|e| match e {
                BackendError::NotFound(_) => LifecycleError::NotFound(appointment_id.to_string()),
                other => persistence(context, other),
            })?;
        decode(&document, context)
    }
}

fn persistence(context: &'static str, source: BackendError) -> LifecycleError {
    LifecycleError::Persistence { context, source }
}

fn decode(document: &Document, context: &'static str) -> LifecycleResult<Appointment> {
    document
        .decode()
        .map_err(|e| persistence(context, BackendError::from(e)))
}
