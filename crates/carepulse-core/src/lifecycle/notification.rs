//! Notification wording for appointment transitions.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::models::{Appointment, TransitionKind};

/// A text message for one recipient. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient_user_id: String,
    pub body: String,
}

/// Composes transition messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Notifier {
    /// Sender name the message opens with
    pub brand_name: String,
    /// Timezone the schedule is rendered in
    pub offset: FixedOffset,
}

impl Default for Notifier {
    fn default() -> Self {
        Self {
            brand_name: "CarePulse".into(),
            offset: Utc.fix(),
        }
    }
}

impl Notifier {
    pub fn new(brand_name: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            brand_name: brand_name.into(),
            offset,
        }
    }

    /// Render a slot as e.g. "Oct 17, 2026, 9:30 AM".
    pub fn format_date_time(&self, at: &DateTime<Utc>) -> String {
        at.with_timezone(&self.offset)
            .format("%b %-d, %Y, %-I:%M %p")
            .to_string()
    }

    /// Message for an appointment that just went through `kind`.
    pub fn compose(&self, kind: TransitionKind, appointment: &Appointment) -> Notification {
        let physician = &appointment.primary_physician;
        let when = self.format_date_time(&appointment.schedule);

        let body = match kind {
            TransitionKind::Schedule => format!(
                "This is from {},\n\
                 Your appointment with Dr. {} has been scheduled for {}.\n\
                 If you have any questions, please contact us.",
                self.brand_name, physician, when
            ),
            TransitionKind::Cancel => {
                let reason_line = appointment
                    .cancellation_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .map(|reason| format!("Reason for cancellation: {}\n", reason))
                    .unwrap_or_default();
                format!(
                    "This is from {},\n\
                     We regret to inform you that your appointment with Dr. {}, scheduled for {}, has been cancelled.\n\
                     {}If you have any questions or need to reschedule, please contact us. \
                     We apologize for any inconvenience this may have caused.",
                    self.brand_name, physician, when, reason_line
                )
            }
            TransitionKind::Other => format!(
                "This is from {},\n\
                 Your appointment with Dr. {} on {} has been updated.\n\
                 If you have any questions, please contact us.",
                self.brand_name, physician, when
            ),
        };

        Notification {
            recipient_user_id: appointment.user_id.clone(),
            body,
        }
    }
}
