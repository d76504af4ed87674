//! Appointment lifecycle tests against the SQLite backend.

use std::cell::Cell;

use carepulse_core::backend::{BackendError, BackendResult, MessagingSender};
use carepulse_core::db::Database;
use carepulse_core::lifecycle::{
    AppointmentManager, LifecycleError, LifecycleSettings, TransitionPolicy,
};
use carepulse_core::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, CancelUpdate, NewAppointment,
    ReplacementFields, ScheduleUpdate,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

/// Sender whose gateway is down.
#[derive(Default)]
struct FailingSender {
    attempts: Cell<usize>,
}

impl MessagingSender for FailingSender {
    fn send_text(&self, _: &[String], _: &str) -> BackendResult<String> {
        self.attempts.set(self.attempts.get() + 1);
        Err(BackendError::Transport("sms gateway unavailable".into()))
    }
}

fn slot() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
}

fn make_request(user_id: &str) -> NewAppointment {
    NewAppointment {
        user_id: user_id.into(),
        patient: format!("patient-of-{}", user_id),
        primary_physician: "Leila Cameron".into(),
        reason: "Annual checkup".into(),
        note: Some("Prefers mornings".into()),
        schedule: slot(),
    }
}

fn schedule(appointment: &Appointment, at: DateTime<Utc>) -> AppointmentUpdate {
    AppointmentUpdate::Schedule(ScheduleUpdate {
        primary_physician: appointment.primary_physician.clone(),
        schedule: at,
        reason: appointment.reason.clone(),
        note: appointment.note.clone(),
    })
}

fn cancel(appointment: &Appointment, reason: Option<&str>) -> AppointmentUpdate {
    AppointmentUpdate::Cancel(CancelUpdate {
        primary_physician: appointment.primary_physician.clone(),
        schedule: appointment.schedule,
        reason: appointment.reason.clone(),
        note: appointment.note.clone(),
        cancellation_reason: reason.map(String::from),
    })
}

#[test]
fn test_create_schedule_get() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    assert!(!created.id.is_empty());
    assert!(!created.created_at.is_empty());
    assert_eq!(created.status, AppointmentStatus::Pending);
    assert!(created.cancellation_reason.is_none());
    assert!(db.list_outbox().unwrap().is_empty());

    let updated = manager.update(&created.id, schedule(&created, slot())).unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.status, AppointmentStatus::Scheduled);

    let fetched = manager.get(&created.id).unwrap();
    assert_eq!(fetched.status, AppointmentStatus::Scheduled);
    assert_eq!(fetched.note.as_deref(), Some("Prefers mornings"));

    let outbox = db.list_outbox().unwrap();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].recipients, vec!["user-1".to_string()]);
    assert!(outbox[0].body.starts_with("This is from CarePulse,"));
    assert!(outbox[0].body.contains(
        "Your appointment with Dr. Leila Cameron has been scheduled for Oct 17, 2026, 9:30 AM."
    ));
}

#[test]
fn test_cancel_with_reason() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    let cancelled = manager
        .update(&created.id, cancel(&created, Some("Doctor unavailable")))
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Doctor unavailable"));

    let outbox = db.list_outbox().unwrap();
    assert_eq!(outbox.len(), 1);
    assert!(outbox[0].body.contains("has been cancelled"));
    assert!(outbox[0].body.contains("Reason for cancellation: Doctor unavailable"));
}

#[test]
fn test_cancel_without_reason() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    let cancelled = manager.update(&created.id, cancel(&created, None)).unwrap();
    assert!(cancelled.cancellation_reason.is_none());

    let body = &db.list_outbox().unwrap()[0].body;
    assert!(!body.contains("Reason for cancellation"));
}

#[test]
fn test_update_missing_appointment_sends_nothing() {
    let db = Database::open_in_memory().unwrap();
    let created = {
        let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());
        manager.create(&make_request("user-1")).unwrap()
    };

    for policy in [TransitionPolicy::Enforce, TransitionPolicy::Permissive] {
        let settings = LifecycleSettings {
            transition_policy: policy,
            ..Default::default()
        };
        let manager = AppointmentManager::new(&db, &db, settings);

        let err = manager.update("no-such-id", schedule(&created, slot())).unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(ref id) if id == "no-such-id"));
    }

    assert!(db.list_outbox().unwrap().is_empty());
}

#[test]
fn test_notification_failure_keeps_saved_update() {
    let db = Database::open_in_memory().unwrap();
    let sender = FailingSender::default();
    let manager = AppointmentManager::new(&db, &sender, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    let err = manager.update(&created.id, schedule(&created, slot())).unwrap_err();

    match err {
        LifecycleError::Notification { appointment, source } => {
            assert_eq!(appointment.status, AppointmentStatus::Scheduled);
            assert!(matches!(source, BackendError::Transport(_)));
        }
        other => panic!("expected notification error, got {:?}", other),
    }
    assert_eq!(sender.attempts.get(), 1);

    // The store write is not rolled back
    assert_eq!(manager.get(&created.id).unwrap().status, AppointmentStatus::Scheduled);
}

#[test]
fn test_enforced_policy_rejects_leaving_cancelled() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    manager.update(&created.id, cancel(&created, None)).unwrap();

    let err = manager.update(&created.id, schedule(&created, slot())).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Scheduled,
            ..
        }
    ));

    let back_to_pending = AppointmentUpdate::Other(ReplacementFields {
        primary_physician: created.primary_physician.clone(),
        reason: created.reason.clone(),
        note: None,
        schedule: created.schedule,
        status: AppointmentStatus::Pending,
        cancellation_reason: None,
    });
    assert!(manager.update(&created.id, back_to_pending).is_err());

    // Only the cancellation was announced
    assert_eq!(db.list_outbox().unwrap().len(), 1);
    assert_eq!(manager.get(&created.id).unwrap().status, AppointmentStatus::Cancelled);
}

#[test]
fn test_reschedule_is_allowed() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let created = manager.create(&make_request("user-1")).unwrap();
    manager.update(&created.id, schedule(&created, slot())).unwrap();
    let moved = manager
        .update(&created.id, schedule(&created, slot() + Duration::days(1)))
        .unwrap();

    assert_eq!(moved.schedule, slot() + Duration::days(1));
    assert_eq!(db.list_outbox().unwrap().len(), 2);
}

#[test]
fn test_competing_updates_last_write_wins() {
    let db = Database::open_in_memory().unwrap();
    let created = AppointmentManager::new(&db, &db, LifecycleSettings::default())
        .create(&make_request("user-1"))
        .unwrap();

    // Two administrators working from the same pending snapshot
    let first = AppointmentManager::new(&db, &db, LifecycleSettings::default());
    let second = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    first.update(&created.id, schedule(&created, slot())).unwrap();
    second
        .update(&created.id, cancel(&created, Some("Clinic closed")))
        .unwrap();

    let stored = first.get(&created.id).unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
    assert_eq!(stored.cancellation_reason.as_deref(), Some("Clinic closed"));
    assert_eq!(db.list_outbox().unwrap().len(), 2);
}

#[test]
fn test_schedule_clears_previous_cancellation_reason() {
    let db = Database::open_in_memory().unwrap();
    let settings = LifecycleSettings {
        transition_policy: TransitionPolicy::Permissive,
        ..Default::default()
    };
    let manager = AppointmentManager::new(&db, &db, settings);

    let created = manager.create(&make_request("user-1")).unwrap();
    manager
        .update(&created.id, cancel(&created, Some("Sick")))
        .unwrap();
    let rescheduled = manager.update(&created.id, schedule(&created, slot())).unwrap();

    assert_eq!(rescheduled.status, AppointmentStatus::Scheduled);
    assert!(rescheduled.cancellation_reason.is_none());
}

#[test]
fn test_list_empty() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let recent = manager.list_recent_with_counts().unwrap();
    assert_eq!(recent.total, 0);
    assert!(recent.appointments.is_empty());
    assert_eq!(recent.counts.sum(), 0);
}

#[test]
fn test_list_counts_and_order() {
    let db = Database::open_in_memory().unwrap();
    let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

    let a = manager.create(&make_request("user-a")).unwrap();
    let b = manager.create(&make_request("user-b")).unwrap();
    let c = manager.create(&make_request("user-c")).unwrap();
    manager.update(&a.id, schedule(&a, slot())).unwrap();
    manager.update(&b.id, cancel(&b, None)).unwrap();

    let recent = manager.list_recent_with_counts().unwrap();
    assert_eq!(recent.total, 3);
    assert_eq!(recent.counts.scheduled_count, 1);
    assert_eq!(recent.counts.pending_count, 1);
    assert_eq!(recent.counts.cancelled_count, 1);

    let ids: Vec<&str> = recent.appointments.iter().map(|x| x.id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str(), b.id.as_str(), a.id.as_str()]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_counts_sum_to_total(actions in prop::collection::vec(0u8..3, 0..12)) {
        let db = Database::open_in_memory().unwrap();
        let manager = AppointmentManager::new(&db, &db, LifecycleSettings::default());

        for (i, action) in actions.iter().enumerate() {
            let created = manager.create(&make_request(&format!("user-{}", i))).unwrap();
            match action {
                1 => { manager.update(&created.id, schedule(&created, slot())).unwrap(); }
                2 => { manager.update(&created.id, cancel(&created, None)).unwrap(); }
                _ => {}
            }
        }

        let recent = manager.list_recent_with_counts().unwrap();
        prop_assert_eq!(recent.total, actions.len() as u64);
        prop_assert_eq!(recent.counts.sum(), actions.len() as u64);
        prop_assert_eq!(
            recent.counts.pending_count,
            actions.iter().filter(|a| **a == 0).count() as u64
        );

        for pair in recent.appointments.windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}
