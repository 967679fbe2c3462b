// src/store/mod.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, Campaign, ChannelCounts, Message, Owner, Patient,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate id {0}")]
    Duplicate(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// All appointments in insertion order.
    async fn list(&self) -> StoreResult<Vec<Appointment>>;
    async fn get(&self, id: &str) -> StoreResult<Option<Appointment>>;
    async fn insert(&self, appointment: &Appointment) -> StoreResult<()>;
    /// Confirmed appointments whose reminder has not been sent, in insertion order.
    async fn pending_reminders(&self) -> StoreResult<Vec<Appointment>>;
    /// Flips `reminder_sent` false -> true. Returns whether this call made the transition.
    async fn claim_reminder(&self, id: &str) -> StoreResult<bool>;
    async fn set_status(&self, id: &str, status: AppointmentStatus) -> StoreResult<bool>;
    async fn count(&self) -> StoreResult<usize>;
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Patient>>;
    async fn get(&self, id: &str) -> StoreResult<Option<Patient>>;
    async fn insert(&self, patient: &Patient) -> StoreResult<()>;
    /// Adds `delta` loyalty points and returns the updated patient.
    async fn add_loyalty_points(&self, id: &str, delta: i64) -> StoreResult<Option<Patient>>;
}

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Owner>>;
    async fn get(&self, id: &str) -> StoreResult<Option<Owner>>;
    async fn insert(&self, owner: &Owner) -> StoreResult<()>;
    /// Adds the monthly payout to the running total; returns the updated owner.
    async fn record_payout(&self, id: &str) -> StoreResult<Option<Owner>>;
    async fn set_satisfaction(&self, id: &str, satisfaction: i32) -> StoreResult<bool>;
    async fn touch_last_communication(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Campaign>>;
    async fn insert(&self, campaign: &Campaign) -> StoreResult<()>;
    async fn record_sent(&self, id: &str, sent: i64) -> StoreResult<bool>;
    async fn count(&self) -> StoreResult<usize>;
}

/// Append-only log of outbound messages.
#[async_trait]
pub trait CommunicationLog: Send + Sync {
    async fn append(&self, message: &Message) -> StoreResult<()>;
    /// queued -> sent. Returns false if the message is unknown or already sent.
    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>>;
    /// Newest `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> StoreResult<Vec<Message>>;
    async fn channel_counts(&self) -> StoreResult<ChannelCounts>;
}

#[derive(Clone)]
pub struct Repositories {
    pub appointments: Arc<dyn AppointmentStore>,
    pub patients: Arc<dyn PatientDirectory>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub campaigns: Arc<dyn CampaignStore>,
    pub communications: Arc<dyn CommunicationLog>,
}

impl Repositories {
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            appointments: store.clone(),
            patients: store.clone(),
            owners: store.clone(),
            campaigns: store.clone(),
            communications: store,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            appointments: store.clone(),
            patients: store.clone(),
            owners: store.clone(),
            campaigns: store.clone(),
            communications: store,
        }
    }
}
