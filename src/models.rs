use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaigns::CampaignRunner;
use crate::comms::Dispatcher;
use crate::reminders::ReminderScanner;
use crate::store::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub dispatcher: Dispatcher,
    pub scanner: Arc<ReminderScanner>,
    pub campaigns: Arc<CampaignRunner>,
    pub sender_name: Arc<str>,
    /// SHA-256 hex of the bearer token every CRM call must present, if any.
    pub api_token_sha256: Option<Arc<str>>,
}

/* -------------------------
   Channels
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "WhatsApp", alias = "whatsapp")]
    WhatsApp,
    #[serde(rename = "SMS", alias = "sms")]
    Sms,
    #[serde(rename = "Email", alias = "email")]
    Email,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::WhatsApp => "WhatsApp",
            Channel::Sms => "SMS",
            Channel::Email => "Email",
        }
    }

    /// Stored as smallint: 0 WhatsApp, 1 SMS, 2 Email
    pub fn as_i16(self) -> i16 {
        match self {
            Channel::WhatsApp => 0,
            Channel::Sms => 1,
            Channel::Email => 2,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(Channel::WhatsApp),
            1 => Some(Channel::Sms),
            2 => Some(Channel::Email),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(Channel::WhatsApp),
            "sms" => Ok(Channel::Sms),
            "email" => Ok(Channel::Email),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Simulated provider latency per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLatencies {
    pub whatsapp: Duration,
    pub sms: Duration,
    pub email: Duration,
}

impl ChannelLatencies {
    pub fn uniform(latency: Duration) -> Self {
        Self {
            whatsapp: latency,
            sms: latency,
            email: latency,
        }
    }

    pub fn for_channel(&self, channel: Channel) -> Duration {
        match channel {
            Channel::WhatsApp => self.whatsapp,
            Channel::Sms => self.sms,
            Channel::Email => self.email,
        }
    }
}

impl Default for ChannelLatencies {
    fn default() -> Self {
        Self {
            whatsapp: Duration::from_millis(1000),
            sms: Duration::from_millis(500),
            email: Duration::from_millis(800),
        }
    }
}

/// Anything that can receive a message on some channel.
pub trait Reachable {
    fn address_for(&self, channel: Channel) -> Option<&str>;
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/* -------------------------
   Appointments
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Stored as smallint: 0 Confirmed, 1 Cancelled, 2 Completed
    pub fn as_i16(self) -> i16 {
        match self {
            AppointmentStatus::Confirmed => 0,
            AppointmentStatus::Cancelled => 1,
            AppointmentStatus::Completed => 2,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(AppointmentStatus::Confirmed),
            1 => Some(AppointmentStatus::Cancelled),
            2 => Some(AppointmentStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    /// Date and time are clinic-local; `offset` is the clinic's UTC offset.
    pub fn starts_at(&self, offset: FixedOffset) -> DateTime<Utc> {
        // A fixed offset maps every local time to exactly one instant.
        offset
            .from_local_datetime(&self.date.and_time(self.time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&self.date.and_time(self.time)))
    }

    pub fn time_until(&self, now: DateTime<Utc>, offset: FixedOffset) -> TimeDelta {
        self.starts_at(offset) - now
    }

    /// Fractional hours, for reporting only; window checks compare [`TimeDelta`]s.
    pub fn hours_until(&self, now: DateTime<Utc>, offset: FixedOffset) -> f64 {
        self.time_until(now, offset).num_milliseconds() as f64 / 3_600_000.0
    }

    pub fn display_date(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    pub fn display_time(&self) -> String {
        self.time.format("%I:%M %p").to_string()
    }

    pub fn reminder_body(&self) -> String {
        format!(
            "Reminder: appointment with {} on {} at {}",
            self.doctor,
            self.display_date(),
            self.display_time()
        )
    }
}

/// Accepts "14:30", "14:30:00" and "10:00 AM".
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/* -------------------------
   Patients & owners
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoyaltyTier {
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    pub fn for_points(points: i64) -> Self {
        if points >= 3000 {
            LoyaltyTier::Platinum
        } else if points >= 1000 {
            LoyaltyTier::Gold
        } else {
            LoyaltyTier::Silver
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub preferred_channel: Option<Channel>,
    pub loyalty_points: i64,
    pub feedback_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Preferred channel, falling back to email.
    pub fn notification_channel(&self) -> Channel {
        self.preferred_channel.unwrap_or(Channel::Email)
    }

    pub fn loyalty_tier(&self) -> LoyaltyTier {
        LoyaltyTier::for_points(self.loyalty_points)
    }

    pub fn is_loyalty_member(&self) -> bool {
        self.loyalty_points > 0
    }
}

impl Reachable for Patient {
    fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::WhatsApp | Channel::Sms => non_blank(&self.phone),
            Channel::Email => non_blank(&self.email),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub hospital_name: String,
    pub owner_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contract_status: String,
    pub monthly_payout: i64,
    pub total_payouts: i64,
    pub satisfaction: i32,
    pub last_communication: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn has_active_contract(&self) -> bool {
        self.contract_status.eq_ignore_ascii_case("active")
    }
}

impl Reachable for Owner {
    fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::WhatsApp | Channel::Sms => non_blank(&self.phone),
            Channel::Email => non_blank(&self.email),
        }
    }
}

/* -------------------------
   Communications log
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
}

impl MessageStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            MessageStatus::Queued => 0,
            MessageStatus::Sent => 1,
        }
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(MessageStatus::Queued),
            1 => Some(MessageStatus::Sent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub recipient: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub template_id: Option<String>,
    pub status: MessageStatus,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// What a caller hands to the dispatcher.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: String,
    pub channel: Channel,
    pub subject: Option<String>,
    pub body: String,
    pub template_id: Option<String>,
}

impl OutboundMessage {
    pub fn new(channel: Channel, recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            channel,
            subject: None,
            body: body.into(),
            template_id: None,
        }
    }

    /// Subject is only carried on email.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        if self.channel == Channel::Email {
            self.subject = Some(subject.into());
        }
        self
    }

    /// Template ids are only meaningful on WhatsApp.
    pub fn with_template(mut self, template_id: Option<String>) -> Self {
        if self.channel == Channel::WhatsApp {
            self.template_id = template_id;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCounts {
    pub whatsapp: i64,
    pub sms: i64,
    pub email: i64,
}

impl ChannelCounts {
    pub fn add(&mut self, channel: Channel, n: i64) {
        match channel {
            Channel::WhatsApp => self.whatsapp += n,
            Channel::Sms => self.sms += n,
            Channel::Email => self.email += n,
        }
    }
}

/* -------------------------
   Campaigns
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    #[serde(rename = "All Patients")]
    AllPatients,
    #[serde(rename = "Loyalty Members")]
    LoyaltyMembers,
    #[serde(rename = "Hospital Owners")]
    HospitalOwners,
}

impl Audience {
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::AllPatients => "All Patients",
            Audience::LoyaltyMembers => "Loyalty Members",
            Audience::HospitalOwners => "Hospital Owners",
        }
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all patients" => Ok(Audience::AllPatients),
            "loyalty members" => Ok(Audience::LoyaltyMembers),
            "hospital owners" => Ok(Audience::HospitalOwners),
            other => Err(format!("unknown campaign target: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub target: Audience,
    pub channels: Vec<Channel>,
    pub subject: Option<String>,
    pub message: String,
    pub template_id: Option<String>,
    pub status: String,
    pub sent: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CampaignResults {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
}

/* -------------------------
   Helpers
--------------------------*/

/// Readable unique token, e.g. `APT3f9c...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}
