// Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use uuid::Uuid;

use crate::comms::{Dispatcher, SimulatedGateway};
use crate::models::{
    Appointment, AppointmentStatus, Channel, ChannelCounts, ChannelLatencies, Message, Patient,
};
use crate::store::{CommunicationLog, MemoryStore, Repositories, StoreError, StoreResult};

/// A communication log whose writes always fail.
pub(crate) struct FailingLog;

#[async_trait]
impl CommunicationLog for FailingLog {
    async fn append(&self, _message: &Message) -> StoreResult<()> {
        Err(StoreError::Corrupt("communication log offline".into()))
    }

    async fn mark_sent(&self, _id: Uuid, _at: DateTime<Utc>) -> StoreResult<bool> {
        Err(StoreError::Corrupt("communication log offline".into()))
    }

    async fn get(&self, _id: Uuid) -> StoreResult<Option<Message>> {
        Ok(None)
    }

    async fn recent(&self, _limit: usize) -> StoreResult<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn channel_counts(&self) -> StoreResult<ChannelCounts> {
        Ok(ChannelCounts::default())
    }
}

pub(crate) struct Harness {
    pub repos: Repositories,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub async fn messages(&self) -> Vec<Message> {
        self.repos.communications.recent(usize::MAX).await.unwrap()
    }
}

/// In-memory repositories and an instant-delivery dispatcher.
pub(crate) fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_with_log(Repositories::in_memory(store))
}

/// Like [`harness`] but every dispatch fails at the log.
pub(crate) fn failing_harness() -> Harness {
    let mut repos = Repositories::in_memory(Arc::new(MemoryStore::new()));
    repos.communications = Arc::new(FailingLog);
    harness_with_log(repos)
}

fn harness_with_log(repos: Repositories) -> Harness {
    let gateway = SimulatedGateway::new(ChannelLatencies::uniform(Duration::ZERO));
    let dispatcher = Dispatcher::spawn(repos.communications.clone(), Arc::new(gateway));
    Harness { repos, dispatcher }
}

pub(crate) fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

pub(crate) fn patient(id: &str, channel: Option<Channel>) -> Patient {
    Patient {
        id: id.into(),
        first_name: "Test".into(),
        last_name: id.into(),
        email: Some(format!("{}@example.com", id.to_lowercase())),
        phone: Some("+15550000000".into()),
        preferred_channel: channel,
        loyalty_points: 0,
        feedback_score: None,
        created_at: Utc::now(),
    }
}

/// Confirmed appointment `minutes` from `now` (UTC clinic clock).
pub(crate) fn appointment_in(
    id: &str,
    patient_id: &str,
    now: DateTime<Utc>,
    minutes: i64,
) -> Appointment {
    let at = (now + ChronoDuration::minutes(minutes)).naive_utc();
    Appointment {
        id: id.into(),
        patient_id: patient_id.into(),
        doctor: "Dr. Smith".into(),
        date: at.date(),
        time: at.time(),
        appointment_type: Some("Follow-up".into()),
        notes: None,
        status: AppointmentStatus::Confirmed,
        reminder_sent: false,
        created_at: now,
    }
}
