// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    AppointmentStore, CampaignStore, CommunicationLog, OwnerDirectory, PatientDirectory,
    StoreError, StoreResult,
};
use crate::models::{
    Appointment, AppointmentStatus, Audience, Campaign, Channel, ChannelCounts, Message,
    MessageStatus, Owner, Patient,
};

pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Unique violations become `Duplicate`, everything else stays a database error.
fn insert_error(e: sqlx::Error, id: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(id.to_string());
        }
    }
    StoreError::Database(e)
}

/* -------------------------
   Row models
--------------------------*/

#[derive(Debug, FromRow)]
struct AppointmentRow {
    appointment_id: String,
    patient_id: String,
    doctor: String,
    scheduled_date: NaiveDate,
    scheduled_time: NaiveTime,
    appointment_type: Option<String>,
    notes: Option<String>,
    status: i16,
    reminder_sent: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::from_i16(r.status).ok_or_else(|| {
            StoreError::Corrupt(format!("appointment {} has status {}", r.appointment_id, r.status))
        })?;
        Ok(Appointment {
            id: r.appointment_id,
            patient_id: r.patient_id,
            doctor: r.doctor,
            date: r.scheduled_date,
            time: r.scheduled_time,
            appointment_type: r.appointment_type,
            notes: r.notes,
            status,
            reminder_sent: r.reminder_sent,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PatientRow {
    patient_id: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    preferred_channel: Option<i16>,
    loyalty_points: i64,
    feedback_score: Option<f64>,
    created_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(r: PatientRow) -> Self {
        Patient {
            id: r.patient_id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            phone: r.phone,
            // Unknown codes behave like "no preference" (email fallback).
            preferred_channel: r.preferred_channel.and_then(Channel::from_i16),
            loyalty_points: r.loyalty_points,
            feedback_score: r.feedback_score,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct OwnerRow {
    owner_id: String,
    hospital_name: String,
    owner_name: String,
    email: Option<String>,
    phone: Option<String>,
    contract_status: String,
    monthly_payout: i64,
    total_payouts: i64,
    satisfaction: i32,
    last_communication: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<OwnerRow> for Owner {
    fn from(r: OwnerRow) -> Self {
        Owner {
            id: r.owner_id,
            hospital_name: r.hospital_name,
            owner_name: r.owner_name,
            email: r.email,
            phone: r.phone,
            contract_status: r.contract_status,
            monthly_payout: r.monthly_payout,
            total_payouts: r.total_payouts,
            satisfaction: r.satisfaction,
            last_communication: r.last_communication,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CampaignRow {
    campaign_id: String,
    name: String,
    target: String,
    channels: Vec<i16>,
    subject: Option<String>,
    message: String,
    template_id: Option<String>,
    status: String,
    sent: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StoreError;

    fn try_from(r: CampaignRow) -> Result<Self, Self::Error> {
        let target: Audience = r.target.parse().map_err(StoreError::Corrupt)?;
        let channels = r
            .channels
            .iter()
            .map(|c| {
                Channel::from_i16(*c).ok_or_else(|| {
                    StoreError::Corrupt(format!("campaign {} has channel {c}", r.campaign_id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Campaign {
            id: r.campaign_id,
            name: r.name,
            target,
            channels,
            subject: r.subject,
            message: r.message,
            template_id: r.template_id,
            status: r.status,
            sent: r.sent,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    message_id: Uuid,
    recipient: String,
    channel: i16,
    subject: Option<String>,
    body: String,
    template_id: Option<String>,
    status: i16,
    queued_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(r: MessageRow) -> Result<Self, Self::Error> {
        let channel = Channel::from_i16(r.channel).ok_or_else(|| {
            StoreError::Corrupt(format!("message {} has channel {}", r.message_id, r.channel))
        })?;
        let status = MessageStatus::from_i16(r.status).ok_or_else(|| {
            StoreError::Corrupt(format!("message {} has status {}", r.message_id, r.status))
        })?;
        Ok(Message {
            id: r.message_id,
            recipient: r.recipient,
            channel,
            subject: r.subject,
            body: r.body,
            template_id: r.template_id,
            status,
            queued_at: r.queued_at,
            sent_at: r.sent_at,
        })
    }
}

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id,
    patient_id,
    doctor,
    scheduled_date,
    scheduled_time,
    appointment_type,
    notes,
    status,
    reminder_sent,
    created_at
"#;

const PATIENT_COLUMNS: &str = r#"
    patient_id,
    first_name,
    last_name,
    email,
    phone,
    preferred_channel,
    loyalty_points,
    feedback_score,
    created_at
"#;

const OWNER_COLUMNS: &str = r#"
    owner_id,
    hospital_name,
    owner_name,
    email,
    phone,
    contract_status,
    monthly_payout,
    total_payouts,
    satisfaction,
    last_communication,
    created_at
"#;

const MESSAGE_COLUMNS: &str = r#"
    message_id,
    recipient,
    channel,
    subject,
    body,
    template_id,
    status,
    queued_at,
    sent_at
"#;

/* -------------------------
   Appointments
--------------------------*/

#[async_trait]
impl AppointmentStore for PgStore {
    async fn list(&self) -> StoreResult<Vec<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM crm_appointment ORDER BY seq ASC");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM crm_appointment WHERE appointment_id = $1");
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn insert(&self, a: &Appointment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crm_appointment (
              appointment_id, patient_id, doctor, scheduled_date, scheduled_time,
              appointment_type, notes, status, reminder_sent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&a.id)
        .bind(&a.patient_id)
        .bind(&a.doctor)
        .bind(a.date)
        .bind(a.time)
        .bind(&a.appointment_type)
        .bind(&a.notes)
        .bind(a.status.as_i16())
        .bind(a.reminder_sent)
        .bind(a.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| insert_error(e, &a.id))?;
        Ok(())
    }

    async fn pending_reminders(&self) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM crm_appointment \
             WHERE status = $1 AND reminder_sent = false ORDER BY seq ASC"
        );
        sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(AppointmentStatus::Confirmed.as_i16())
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    async fn claim_reminder(&self, id: &str) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE crm_appointment
            SET reminder_sent = true
            WHERE appointment_id = $1 AND reminder_sent = false AND status = $2
            "#,
        )
        .bind(id)
        .bind(AppointmentStatus::Confirmed.as_i16())
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_status(&self, id: &str, status: AppointmentStatus) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE crm_appointment
            SET status = $2
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_i16())
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn count(&self) -> StoreResult<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crm_appointment")
            .fetch_one(&self.db)
            .await?;
        Ok(n as usize)
    }
}

/* -------------------------
   Patients
--------------------------*/

#[async_trait]
impl PatientDirectory for PgStore {
    async fn list(&self) -> StoreResult<Vec<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM crm_patient ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, PatientRow>(&sql).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(Patient::from).collect())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM crm_patient WHERE patient_id = $1");
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Patient::from))
    }

    async fn insert(&self, p: &Patient) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO crm_patient (
              patient_id, first_name, last_name, email, phone,
              preferred_channel, loyalty_points, feedback_score, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&p.id)
        .bind(&p.first_name)
        .bind(&p.last_name)
        .bind(&p.email)
        .bind(&p.phone)
        .bind(p.preferred_channel.map(Channel::as_i16))
        .bind(p.loyalty_points)
        .bind(p.feedback_score)
        .bind(p.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| insert_error(e, &p.id))?;
        Ok(())
    }

    async fn add_loyalty_points(&self, id: &str, delta: i64) -> StoreResult<Option<Patient>> {
        let sql = format!(
            "UPDATE crm_patient SET loyalty_points = loyalty_points + $2 \
             WHERE patient_id = $1 RETURNING {PATIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Patient::from))
    }
}

/* -------------------------
   Owners
--------------------------*/

#[async_trait]
impl OwnerDirectory for PgStore {
    async fn list(&self) -> StoreResult<Vec<Owner>> {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM hospital_owner ORDER BY seq ASC");
        let rows = sqlx::query_as::<_, OwnerRow>(&sql).fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(Owner::from).collect())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Owner>> {
        let sql = format!("SELECT {OWNER_COLUMNS} FROM hospital_owner WHERE owner_id = $1");
        let row = sqlx::query_as::<_, OwnerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Owner::from))
    }

    async fn insert(&self, o: &Owner) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hospital_owner (
              owner_id, hospital_name, owner_name, email, phone, contract_status,
              monthly_payout, total_payouts, satisfaction, last_communication, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&o.id)
        .bind(&o.hospital_name)
        .bind(&o.owner_name)
        .bind(&o.email)
        .bind(&o.phone)
        .bind(&o.contract_status)
        .bind(o.monthly_payout)
        .bind(o.total_payouts)
        .bind(o.satisfaction)
        .bind(o.last_communication)
        .bind(o.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| insert_error(e, &o.id))?;
        Ok(())
    }

    async fn record_payout(&self, id: &str) -> StoreResult<Option<Owner>> {
        let sql = format!(
            "UPDATE hospital_owner SET total_payouts = total_payouts + monthly_payout \
             WHERE owner_id = $1 RETURNING {OWNER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OwnerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Owner::from))
    }

    async fn set_satisfaction(&self, id: &str, satisfaction: i32) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE hospital_owner SET satisfaction = $2 WHERE owner_id = $1")
            .bind(id)
            .bind(satisfaction)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn touch_last_communication(&self, id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE hospital_owner SET last_communication = $2 WHERE owner_id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}

/* -------------------------
   Campaigns
--------------------------*/

#[async_trait]
impl CampaignStore for PgStore {
    async fn list(&self) -> StoreResult<Vec<Campaign>> {
        sqlx::query_as::<_, CampaignRow>(
            r#"
            SELECT
              campaign_id,
              name,
              target,
              channels,
              subject,
              message,
              template_id,
              status,
              sent,
              created_at
            FROM crm_campaign
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(Campaign::try_from)
        .collect()
    }

    async fn insert(&self, c: &Campaign) -> StoreResult<()> {
        let channels: Vec<i16> = c.channels.iter().map(|ch| ch.as_i16()).collect();
        sqlx::query(
            r#"
            INSERT INTO crm_campaign (
              campaign_id, name, target, channels, subject, message,
              template_id, status, sent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&c.id)
        .bind(&c.name)
        .bind(c.target.as_str())
        .bind(&channels)
        .bind(&c.subject)
        .bind(&c.message)
        .bind(&c.template_id)
        .bind(&c.status)
        .bind(c.sent)
        .bind(c.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| insert_error(e, &c.id))?;
        Ok(())
    }

    async fn record_sent(&self, id: &str, sent: i64) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE crm_campaign SET sent = $2 WHERE campaign_id = $1")
            .bind(id)
            .bind(sent)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn count(&self) -> StoreResult<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crm_campaign")
            .fetch_one(&self.db)
            .await?;
        Ok(n as usize)
    }
}

/* -------------------------
   Communications
--------------------------*/

#[async_trait]
impl CommunicationLog for PgStore {
    async fn append(&self, m: &Message) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO communication (
              message_id, recipient, channel, subject, body,
              template_id, status, queued_at, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(m.id)
        .bind(&m.recipient)
        .bind(m.channel.as_i16())
        .bind(&m.subject)
        .bind(&m.body)
        .bind(&m.template_id)
        .bind(m.status.as_i16())
        .bind(m.queued_at)
        .bind(m.sent_at)
        .execute(&self.db)
        .await
        .map_err(|e| insert_error(e, &m.id.to_string()))?;
        Ok(())
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE communication
            SET status = $2, sent_at = $3
            WHERE message_id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(MessageStatus::Sent.as_i16())
        .bind(at)
        .bind(MessageStatus::Queued.as_i16())
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM communication WHERE message_id = $1");
        sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(Message::try_from)
            .transpose()
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM communication ORDER BY seq DESC LIMIT $1"
        );
        let mut out = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        out.reverse();
        Ok(out)
    }

    async fn channel_counts(&self) -> StoreResult<ChannelCounts> {
        let rows: Vec<(i16, i64)> = sqlx::query_as(
            r#"
            SELECT channel, COUNT(*)
            FROM communication
            GROUP BY channel
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut counts = ChannelCounts::default();
        for (code, n) in rows {
            if let Some(channel) = Channel::from_i16(code) {
                counts.add(channel, n);
            }
        }
        Ok(counts)
    }
}
