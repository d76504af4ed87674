//! Appointment models and the status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Appointment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Requested by the patient, awaiting an administrator
    Pending,
    /// Confirmed by an administrator
    Scheduled,
    /// Cancelled by an administrator
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// Whether an update may move an appointment from `self` to `next`.
    ///
    /// Staying in the same status is always allowed (edits, reschedules).
    /// Nothing leads back to pending, and cancelled is terminal.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (*self, next),
            (Pending, _) | (Scheduled, Scheduled) | (Scheduled, Cancelled) | (Cancelled, Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(format!("Unknown appointment status: {}", s)),
        }
    }
}

/// A persisted appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Store-assigned id
    #[serde(rename = "$id")]
    pub id: String,
    /// Creation timestamp (store-assigned)
    #[serde(rename = "$createdAt")]
    pub created_at: String,
    /// Last update timestamp (store-assigned)
    #[serde(rename = "$updatedAt")]
    pub updated_at: String,
    /// Owning account
    pub user_id: String,
    /// Patient document id
    #[serde(deserialize_with = "reference_id")]
    pub patient: String,
    /// Doctor name from the roster
    pub primary_physician: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub note: Option<String>,
    /// Requested or confirmed slot
    pub schedule: DateTime<Utc>,
    pub status: AppointmentStatus,
    /// Only populated on cancellation
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

/// Accept either a bare id or an expanded related document carrying `$id`.
fn reference_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reference {
        Id(String),
        Expanded {
            #[serde(rename = "$id")]
            id: String,
        },
    }

    Ok(match Reference::deserialize(deserializer)? {
        Reference::Id(id) => id,
        Reference::Expanded { id } => id,
    })
}

/// A patient-initiated appointment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub user_id: String,
    pub patient: String,
    pub primary_physician: String,
    pub reason: String,
    pub note: Option<String>,
    pub schedule: DateTime<Utc>,
}

/// Attributes written when an appointment document is created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppointmentDocument<'a> {
    pub user_id: &'a str,
    pub patient: &'a str,
    pub primary_physician: &'a str,
    pub reason: &'a str,
    pub note: Option<&'a str>,
    pub schedule: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl<'a> From<&'a NewAppointment> for AppointmentDocument<'a> {
    fn from(new: &'a NewAppointment) -> Self {
        Self {
            user_id: &new.user_id,
            patient: &new.patient,
            primary_physician: &new.primary_physician,
            reason: new.reason.trim(),
            note: new.note.as_deref().map(str::trim).filter(|n| !n.is_empty()),
            schedule: new.schedule,
            status: AppointmentStatus::Pending,
        }
    }
}

/// Full replacement of an appointment's mutable attributes.
///
/// `None` clears the attribute in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementFields {
    pub primary_physician: String,
    pub reason: String,
    pub note: Option<String>,
    pub schedule: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
}

/// Caller-declared intent of an update; selects notification wording.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Schedule,
    Cancel,
    Other,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransitionKind::Schedule => "schedule",
            TransitionKind::Cancel => "cancel",
            TransitionKind::Other => "other",
        })
    }
}

/// Attributes required to confirm an appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub primary_physician: String,
    pub schedule: DateTime<Utc>,
    pub reason: String,
    pub note: Option<String>,
}

/// Attributes required to cancel an appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelUpdate {
    pub primary_physician: String,
    /// The original slot, quoted back in the notification
    pub schedule: DateTime<Utc>,
    pub reason: String,
    pub note: Option<String>,
    pub cancellation_reason: Option<String>,
}

/// An update request, typed per transition kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentUpdate {
    /// Moves the appointment to scheduled
    Schedule(ScheduleUpdate),
    /// Moves the appointment to cancelled
    Cancel(CancelUpdate),
    /// Any other edit; the caller supplies the status
    Other(ReplacementFields),
}

impl AppointmentUpdate {
    pub fn kind(&self) -> TransitionKind {
        match self {
            AppointmentUpdate::Schedule(_) => TransitionKind::Schedule,
            AppointmentUpdate::Cancel(_) => TransitionKind::Cancel,
            AppointmentUpdate::Other(_) => TransitionKind::Other,
        }
    }

    /// Status the appointment will have after this update.
    pub fn target_status(&self) -> AppointmentStatus {
        match self {
            AppointmentUpdate::Schedule(_) => AppointmentStatus::Scheduled,
            AppointmentUpdate::Cancel(_) => AppointmentStatus::Cancelled,
            AppointmentUpdate::Other(fields) => fields.status,
        }
    }

    /// Flatten into the replacement written to the store.
    pub fn into_fields(self) -> ReplacementFields {
        match self {
            AppointmentUpdate::Schedule(update) => ReplacementFields {
                primary_physician: update.primary_physician,
                reason: update.reason,
                note: non_blank(update.note),
                schedule: update.schedule,
                status: AppointmentStatus::Scheduled,
                cancellation_reason: None,
            },
            AppointmentUpdate::Cancel(update) => ReplacementFields {
                primary_physician: update.primary_physician,
                reason: update.reason,
                note: non_blank(update.note),
                schedule: update.schedule,
                status: AppointmentStatus::Cancelled,
                cancellation_reason: non_blank(update.cancellation_reason),
            },
            AppointmentUpdate::Other(mut fields) => {
                fields.note = non_blank(fields.note);
                fields.cancellation_reason = non_blank(fields.cancellation_reason);
                fields
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Per-status counters. All start at zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub scheduled_count: u64,
    pub pending_count: u64,
    pub cancelled_count: u64,
}

impl StatusCounts {
    /// Count statuses in one pass.
    pub fn tally<'a>(appointments: impl IntoIterator<Item = &'a Appointment>) -> Self {
        appointments
            .into_iter()
            .fold(Self::default(), |mut counts, appointment| {
                counts.record(appointment.status);
                counts
            })
    }

    pub fn record(&mut self, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Scheduled => self.scheduled_count += 1,
            AppointmentStatus::Pending => self.pending_count += 1,
            AppointmentStatus::Cancelled => self.cancelled_count += 1,
        }
    }

    pub fn sum(&self) -> u64 {
        self.scheduled_count + self.pending_count + self.cancelled_count
    }
}

/// Admin dashboard data: most recent appointments first, plus counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentAppointments {
    pub total: u64,
    pub appointments: Vec<Appointment>,
    #[serde(flatten)]
    pub counts: StatusCounts,
}
