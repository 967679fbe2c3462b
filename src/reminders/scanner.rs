// src/reminders/scanner.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::comms::{DispatchError, Dispatcher};
use crate::models::{Appointment, Channel, Message, Reachable};
use crate::store::{AppointmentStore, PatientDirectory, StoreError};

pub const REMINDER_SUBJECT: &str = "Appointment Reminder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Only appointments inside the reminder window (periodic scans).
    Windowed,
    /// Every pending appointment, whatever its start time.
    AllPending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReminderOutcome {
    #[serde(rename_all = "camelCase")]
    Dispatched { message_id: Uuid, channel: Channel },
    #[serde(rename_all = "camelCase")]
    OutsideWindow { hours_until: f64 },
    PatientMissing,
    NoContact { channel: Channel },
    /// Another scan or a manual reminder got there first.
    AlreadyClaimed,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentOutcome {
    pub appointment_id: String,
    #[serde(flatten)]
    pub outcome: ReminderOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scanned: usize,
    pub dispatched: usize,
    pub outside_window: usize,
    pub patient_missing: usize,
    pub no_contact: usize,
    pub already_claimed: usize,
    pub failed: usize,
    pub outcomes: Vec<AppointmentOutcome>,
}

impl ScanReport {
    fn record(&mut self, appointment_id: String, outcome: ReminderOutcome) {
        self.scanned += 1;
        match &outcome {
            ReminderOutcome::Dispatched { .. } => self.dispatched += 1,
            ReminderOutcome::OutsideWindow { .. } => self.outside_window += 1,
            ReminderOutcome::PatientMissing => self.patient_missing += 1,
            ReminderOutcome::NoContact { .. } => self.no_contact += 1,
            ReminderOutcome::AlreadyClaimed => self.already_claimed += 1,
            ReminderOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(AppointmentOutcome {
            appointment_id,
            outcome,
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemindError {
    #[error("appointment {0} not found")]
    AppointmentNotFound(String),
    #[error("patient {0} not found")]
    PatientNotFound(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Finds confirmed appointments inside the reminder window and sends each
/// patient one reminder on their preferred channel.
///
/// The reminder flag is claimed before dispatch, so a reminder goes out at
/// most once even when scans and manual reminders race.
pub struct ReminderScanner {
    appointments: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientDirectory>,
    dispatcher: Dispatcher,
    window: TimeDelta,
    clinic_offset: FixedOffset,
    scan_lock: Mutex<()>,
}

impl ReminderScanner {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        patients: Arc<dyn PatientDirectory>,
        dispatcher: Dispatcher,
        window_hours: i64,
        clinic_offset: FixedOffset,
    ) -> Self {
        Self {
            appointments,
            patients,
            dispatcher,
            window: TimeDelta::hours(window_hours),
            clinic_offset,
            scan_lock: Mutex::new(()),
        }
    }

    fn in_window(&self, until: TimeDelta) -> bool {
        until > TimeDelta::zero() && until <= self.window
    }

    pub async fn scan(&self, mode: ScanMode) -> Result<ScanReport, StoreError> {
        self.scan_at(Utc::now(), mode).await
    }

    #[instrument(skip(self))]
    pub async fn scan_at(&self, now: DateTime<Utc>, mode: ScanMode) -> Result<ScanReport, StoreError> {
        let _guard = self.scan_lock.lock().await;

        let pending = self.appointments.pending_reminders().await?;
        let mut report = ScanReport::default();

        for appointment in &pending {
            let outcome = self.evaluate(appointment, now, mode).await;
            match &outcome {
                ReminderOutcome::Dispatched { message_id, channel } => {
                    info!(appointment_id = %appointment.id, %message_id, %channel, "reminder dispatched")
                }
                ReminderOutcome::OutsideWindow { hours_until } => {
                    debug!(appointment_id = %appointment.id, hours_until, "outside reminder window")
                }
                ReminderOutcome::PatientMissing => {
                    warn!(appointment_id = %appointment.id, patient_id = %appointment.patient_id, "patient missing, reminder skipped")
                }
                ReminderOutcome::NoContact { channel } => {
                    warn!(appointment_id = %appointment.id, %channel, "patient has no address for channel, reminder skipped")
                }
                ReminderOutcome::AlreadyClaimed => {
                    debug!(appointment_id = %appointment.id, "reminder already claimed")
                }
                ReminderOutcome::Failed { reason } => {
                    warn!(appointment_id = %appointment.id, "reminder failed: {reason}")
                }
            }
            report.record(appointment.id.clone(), outcome);
        }

        info!(
            scanned = report.scanned,
            dispatched = report.dispatched,
            failed = report.failed,
            "reminder scan complete"
        );
        Ok(report)
    }

    async fn evaluate(&self, appointment: &Appointment, now: DateTime<Utc>, mode: ScanMode) -> ReminderOutcome {
        let until = appointment.time_until(now, self.clinic_offset);
        if mode == ScanMode::Windowed && !self.in_window(until) {
            return ReminderOutcome::OutsideWindow {
                hours_until: appointment.hours_until(now, self.clinic_offset),
            };
        }

        let patient = match self.patients.get(&appointment.patient_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return ReminderOutcome::PatientMissing,
            Err(e) => return ReminderOutcome::Failed { reason: e.to_string() },
        };

        let channel = patient.notification_channel();
        if patient.address_for(channel).is_none() {
            // Left unclaimed so a later scan can pick it up once contact details exist.
            return ReminderOutcome::NoContact { channel };
        }

        match self.appointments.claim_reminder(&appointment.id).await {
            Ok(true) => {}
            Ok(false) => return ReminderOutcome::AlreadyClaimed,
            Err(e) => return ReminderOutcome::Failed { reason: e.to_string() },
        }

        match self
            .dispatcher
            .send_to(&patient, channel, &appointment.reminder_body(), REMINDER_SUBJECT, None)
            .await
        {
            Ok(message) => ReminderOutcome::Dispatched {
                message_id: message.id,
                channel,
            },
            Err(e) => ReminderOutcome::Failed { reason: e.to_string() },
        }
    }

    /// Sends a reminder now, ignoring the window and the reminder flag, then sets the flag.
    #[instrument(skip(self))]
    pub async fn remind(&self, appointment_id: &str) -> Result<Message, RemindError> {
        let appointment = self
            .appointments
            .get(appointment_id)
            .await?
            .ok_or_else(|| RemindError::AppointmentNotFound(appointment_id.to_string()))?;

        let patient = self
            .patients
            .get(&appointment.patient_id)
            .await?
            .ok_or_else(|| RemindError::PatientNotFound(appointment.patient_id.clone()))?;

        let channel = patient.notification_channel();
        let message = self
            .dispatcher
            .send_to(&patient, channel, &appointment.reminder_body(), REMINDER_SUBJECT, None)
            .await?;

        self.appointments.claim_reminder(&appointment.id).await?;

        info!(appointment_id, message_id = %message.id, %channel, "manual reminder dispatched");
        Ok(message)
    }

    /// Scans on a fixed period until `shutdown` flips to true or its sender is dropped.
    pub async fn run_periodic(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_secs = period.as_secs(), "reminder scanner started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan(ScanMode::Windowed).await {
                        error!("reminder scan failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reminder scanner stopped");
    }
}
