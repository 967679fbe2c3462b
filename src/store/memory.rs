// src/store/memory.rs

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AppointmentStore, CampaignStore, CommunicationLog, OwnerDirectory, PatientDirectory,
    StoreError, StoreResult,
};
use crate::models::{
    Appointment, AppointmentStatus, Campaign, Channel, ChannelCounts, Message, MessageStatus,
    Owner, Patient,
};

/// Process-local store. Vectors keep insertion order, which is also scan order.
#[derive(Default)]
pub struct MemoryStore {
    appointments: RwLock<Vec<Appointment>>,
    patients: RwLock<Vec<Patient>>,
    owners: RwLock<Vec<Owner>>,
    campaigns: RwLock<Vec<Campaign>>,
    communications: RwLock<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample owners, patients and one appointment ~20h ahead of `now` (clinic-local).
    pub fn with_demo_data(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = (now + Duration::hours(20)).with_timezone(&offset).naive_local();

        let owners = vec![
            Owner {
                id: "OWN001".into(),
                hospital_name: "City General Hospital".into(),
                owner_name: "Dr. John Smith".into(),
                email: Some("john.smith@citygeneral.com".into()),
                phone: Some("+1-555-0100".into()),
                contract_status: "Active".into(),
                monthly_payout: 15_000,
                total_payouts: 285_000,
                satisfaction: 85,
                last_communication: None,
                created_at: now,
            },
            Owner {
                id: "OWN002".into(),
                hospital_name: "Riverside Medical Center".into(),
                owner_name: "Dr. Sarah Johnson".into(),
                email: Some("sarah.j@riverside.com".into()),
                phone: Some("+1-555-0200".into()),
                contract_status: "Active".into(),
                monthly_payout: 18_000,
                total_payouts: 342_000,
                satisfaction: 92,
                last_communication: None,
                created_at: now,
            },
        ];

        let patients = vec![
            Patient {
                id: "PAT001".into(),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                email: Some("jane.doe@email.com".into()),
                phone: Some("+1-555-1001".into()),
                preferred_channel: Some(Channel::WhatsApp),
                loyalty_points: 2500,
                feedback_score: Some(4.5),
                created_at: now,
            },
            Patient {
                id: "PAT002".into(),
                first_name: "Robert".into(),
                last_name: "Chen".into(),
                email: Some("robert.chen@email.com".into()),
                phone: Some("+1-555-1002".into()),
                preferred_channel: Some(Channel::Sms),
                loyalty_points: 5200,
                feedback_score: Some(4.8),
                created_at: now,
            },
        ];

        let appointments = vec![Appointment {
            id: "APT001".into(),
            patient_id: "PAT001".into(),
            doctor: "Dr. Smith".into(),
            date: local.date(),
            time: local.time(),
            appointment_type: Some("Follow-up".into()),
            notes: None,
            status: AppointmentStatus::Confirmed,
            reminder_sent: false,
            created_at: now,
        }];

        Self {
            appointments: RwLock::new(appointments),
            patients: RwLock::new(patients),
            owners: RwLock::new(owners),
            campaigns: RwLock::new(Vec::new()),
            communications: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Appointment>> {
        Ok(self.appointments.read().await.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Appointment>> {
        Ok(self.appointments.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn insert(&self, appointment: &Appointment) -> StoreResult<()> {
        let mut rows = self.appointments.write().await;
        if rows.iter().any(|a| a.id == appointment.id) {
            return Err(StoreError::Duplicate(appointment.id.clone()));
        }
        rows.push(appointment.clone());
        Ok(())
    }

    async fn pending_reminders(&self) -> StoreResult<Vec<Appointment>> {
        Ok(self
            .appointments
            .read()
            .await
            .iter()
            .filter(|a| a.status == AppointmentStatus::Confirmed && !a.reminder_sent)
            .cloned()
            .collect())
    }

    async fn claim_reminder(&self, id: &str) -> StoreResult<bool> {
        let mut rows = self.appointments.write().await;
        match rows.iter_mut().find(|a| a.id == id) {
            Some(a) if !a.reminder_sent && a.status == AppointmentStatus::Confirmed => {
                a.reminder_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_status(&self, id: &str, status: AppointmentStatus) -> StoreResult<bool> {
        let mut rows = self.appointments.write().await;
        match rows.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.appointments.read().await.len())
    }
}

#[async_trait]
impl PatientDirectory for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Patient>> {
        Ok(self.patients.read().await.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Patient>> {
        Ok(self.patients.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, patient: &Patient) -> StoreResult<()> {
        let mut rows = self.patients.write().await;
        if rows.iter().any(|p| p.id == patient.id) {
            return Err(StoreError::Duplicate(patient.id.clone()));
        }
        rows.push(patient.clone());
        Ok(())
    }

    async fn add_loyalty_points(&self, id: &str, delta: i64) -> StoreResult<Option<Patient>> {
        let mut rows = self.patients.write().await;
        Ok(rows.iter_mut().find(|p| p.id == id).map(|p| {
            p.loyalty_points = p.loyalty_points.saturating_add(delta);
            p.clone()
        }))
    }
}

#[async_trait]
impl OwnerDirectory for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Owner>> {
        Ok(self.owners.read().await.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Owner>> {
        Ok(self.owners.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn insert(&self, owner: &Owner) -> StoreResult<()> {
        let mut rows = self.owners.write().await;
        if rows.iter().any(|o| o.id == owner.id) {
            return Err(StoreError::Duplicate(owner.id.clone()));
        }
        rows.push(owner.clone());
        Ok(())
    }

    async fn record_payout(&self, id: &str) -> StoreResult<Option<Owner>> {
        let mut rows = self.owners.write().await;
        Ok(rows.iter_mut().find(|o| o.id == id).map(|o| {
            o.total_payouts = o.total_payouts.saturating_add(o.monthly_payout);
            o.clone()
        }))
    }

    async fn set_satisfaction(&self, id: &str, satisfaction: i32) -> StoreResult<bool> {
        let mut rows = self.owners.write().await;
        match rows.iter_mut().find(|o| o.id == id) {
            Some(o) => {
                o.satisfaction = satisfaction;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_communication(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut rows = self.owners.write().await;
        match rows.iter_mut().find(|o| o.id == id) {
            Some(o) => {
                o.last_communication = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Campaign>> {
        Ok(self.campaigns.read().await.clone())
    }

    async fn insert(&self, campaign: &Campaign) -> StoreResult<()> {
        let mut rows = self.campaigns.write().await;
        if rows.iter().any(|c| c.id == campaign.id) {
            return Err(StoreError::Duplicate(campaign.id.clone()));
        }
        rows.push(campaign.clone());
        Ok(())
    }

    async fn record_sent(&self, id: &str, sent: i64) -> StoreResult<bool> {
        let mut rows = self.campaigns.write().await;
        match rows.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.sent = sent;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.campaigns.read().await.len())
    }
}

#[async_trait]
impl CommunicationLog for MemoryStore {
    async fn append(&self, message: &Message) -> StoreResult<()> {
        let mut rows = self.communications.write().await;
        if rows.iter().any(|m| m.id == message.id) {
            return Err(StoreError::Duplicate(message.id.to_string()));
        }
        rows.push(message.clone());
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut rows = self.communications.write().await;
        match rows.iter_mut().find(|m| m.id == id) {
            Some(m) if m.status == MessageStatus::Queued => {
                m.status = MessageStatus::Sent;
                m.sent_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.communications.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<Message>> {
        let rows = self.communications.read().await;
        let start = rows.len().saturating_sub(limit);
        Ok(rows[start..].to_vec())
    }

    async fn channel_counts(&self) -> StoreResult<ChannelCounts> {
        let mut counts = ChannelCounts::default();
        for m in self.communications.read().await.iter() {
            counts.add(m.channel, 1);
        }
        Ok(counts)
    }
}
