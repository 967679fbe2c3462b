// src/campaigns.rs

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::comms::Dispatcher;
use crate::models::{
    Audience, Campaign, CampaignResults, Channel, Owner, Patient, Reachable, new_id,
};
use crate::store::{CampaignStore, OwnerDirectory, PatientDirectory, StoreError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub target: String,
    pub channels: Vec<Channel>,
    pub subject: Option<String>,
    pub message: String,
    pub template_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A resolved campaign recipient.
#[derive(Debug, Clone)]
pub enum Recipient {
    Patient(Patient),
    Owner(Owner),
}

impl Recipient {
    pub fn id(&self) -> &str {
        match self {
            Recipient::Patient(p) => &p.id,
            Recipient::Owner(o) => &o.id,
        }
    }
}

impl Reachable for Recipient {
    fn address_for(&self, channel: Channel) -> Option<&str> {
        match self {
            Recipient::Patient(p) => p.address_for(channel),
            Recipient::Owner(o) => o.address_for(channel),
        }
    }
}

pub struct CampaignRunner {
    patients: Arc<dyn PatientDirectory>,
    owners: Arc<dyn OwnerDirectory>,
    campaigns: Arc<dyn CampaignStore>,
    dispatcher: Dispatcher,
    sender_name: Arc<str>,
}

impl CampaignRunner {
    pub fn new(
        patients: Arc<dyn PatientDirectory>,
        owners: Arc<dyn OwnerDirectory>,
        campaigns: Arc<dyn CampaignStore>,
        dispatcher: Dispatcher,
        sender_name: Arc<str>,
    ) -> Self {
        Self {
            patients,
            owners,
            campaigns,
            dispatcher,
            sender_name,
        }
    }

    pub async fn resolve_audience(&self, audience: Audience) -> Result<Vec<Recipient>, StoreError> {
        let targets = match audience {
            Audience::AllPatients => self
                .patients
                .list()
                .await?
                .into_iter()
                .map(Recipient::Patient)
                .collect(),
            Audience::LoyaltyMembers => self
                .patients
                .list()
                .await?
                .into_iter()
                .filter(Patient::is_loyalty_member)
                .map(Recipient::Patient)
                .collect(),
            Audience::HospitalOwners => self
                .owners
                .list()
                .await?
                .into_iter()
                .map(Recipient::Owner)
                .collect(),
        };
        Ok(targets)
    }

    /// Records the campaign, fans it out and stores the sent count.
    #[instrument(skip(self, req), fields(name = %req.name, target = %req.target))]
    pub async fn launch(&self, req: NewCampaign) -> Result<(Campaign, CampaignResults), CampaignError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(CampaignError::Invalid("name is required".into()));
        }
        if req.message.trim().is_empty() {
            return Err(CampaignError::Invalid("message is required".into()));
        }
        let target: Audience = req.target.parse().map_err(CampaignError::Invalid)?;

        let mut channels: Vec<Channel> = Vec::with_capacity(req.channels.len());
        for c in req.channels {
            if !channels.contains(&c) {
                channels.push(c);
            }
        }
        if channels.is_empty() {
            return Err(CampaignError::Invalid("at least one channel is required".into()));
        }

        let mut campaign = Campaign {
            id: new_id("CAMP"),
            name: name.to_string(),
            target,
            channels,
            subject: req.subject.filter(|s| !s.trim().is_empty()),
            message: req.message,
            template_id: req.template_id,
            status: "Active".into(),
            sent: 0,
            created_at: Utc::now(),
        };
        self.campaigns.insert(&campaign).await?;

        let targets = self.resolve_audience(target).await?;
        let results = self.fan_out(&campaign, &targets).await;

        campaign.sent = results.sent as i64;
        self.campaigns.record_sent(&campaign.id, campaign.sent).await?;

        info!(
            campaign_id = %campaign.id,
            recipients = targets.len(),
            total = results.total,
            sent = results.sent,
            failed = results.failed,
            "campaign launched"
        );
        Ok((campaign, results))
    }

    /// Best effort: a failed dispatch is counted and the fan-out carries on.
    async fn fan_out(&self, campaign: &Campaign, targets: &[Recipient]) -> CampaignResults {
        let mut results = CampaignResults::default();
        let subject = campaign
            .subject
            .clone()
            .unwrap_or_else(|| format!("Message from {}", self.sender_name));

        for target in targets {
            for &channel in &campaign.channels {
                if target.address_for(channel).is_none() {
                    continue;
                }
                results.total += 1;

                match self
                    .dispatcher
                    .send_to(target, channel, &campaign.message, &subject, campaign.template_id.clone())
                    .await
                {
                    Ok(_) => results.sent += 1,
                    Err(e) => {
                        results.failed += 1;
                        warn!(campaign_id = %campaign.id, recipient = target.id(), %channel, "campaign dispatch failed: {e}");
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageStatus;
    use crate::test_support::{Harness, failing_harness, harness, patient};

    fn runner(h: &Harness) -> CampaignRunner {
        CampaignRunner::new(
            h.repos.patients.clone(),
            h.repos.owners.clone(),
            h.repos.campaigns.clone(),
            h.dispatcher.clone(),
            Arc::from("GrandPro HMSO"),
        )
    }

    fn request(target: &str, channels: Vec<Channel>) -> NewCampaign {
        NewCampaign {
            name: "Health Awareness Week".into(),
            target: target.into(),
            channels,
            subject: None,
            message: "Free check-ups this week".into(),
            template_id: Some("tpl-health".into()),
        }
    }

    fn owner(id: &str, phone: Option<&str>) -> Owner {
        Owner {
            id: id.into(),
            hospital_name: "City General".into(),
            owner_name: "Dr. Owner".into(),
            email: Some(format!("{id}@hospital.test")),
            phone: phone.map(str::to_string),
            contract_status: "Active".into(),
            monthly_payout: 100,
            total_payouts: 0,
            satisfaction: 80,
            last_communication: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn loyalty_members_email_campaign_reaches_only_members() {
        let h = harness();
        let mut a = patient("PAT1", None);
        a.loyalty_points = 2500;
        let mut b = patient("PAT2", None);
        b.loyalty_points = 10;
        let c = patient("PAT3", None);
        for p in [&a, &b, &c] {
            h.repos.patients.insert(p).await.unwrap();
        }

        let (campaign, results) = runner(&h)
            .launch(request("Loyalty Members", vec![Channel::Email]))
            .await
            .unwrap();

        assert_eq!(results, CampaignResults { total: 2, sent: 2, failed: 0 });
        assert_eq!(campaign.sent, 2);

        let messages = h.messages().await;
        let recipients: Vec<&str> = messages.iter().map(|m| m.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["pat1@example.com", "pat2@example.com"]);
        assert!(messages.iter().all(|m| m.subject.as_deref() == Some("Message from GrandPro HMSO")));
        assert!(messages.iter().all(|m| m.template_id.is_none()));
    }

    #[tokio::test]
    async fn total_counts_only_pairs_with_a_contact_field() {
        let h = harness();
        let mut no_phone = patient("PAT1", None);
        no_phone.phone = None;
        h.repos.patients.insert(&no_phone).await.unwrap();
        h.repos.patients.insert(&patient("PAT2", None)).await.unwrap();

        let (_, results) = runner(&h)
            .launch(request("All Patients", vec![Channel::Sms, Channel::Email, Channel::WhatsApp]))
            .await
            .unwrap();

        // PAT1: email only; PAT2: all three.
        assert_eq!(results.total, 4);
        assert_eq!(results.total, results.sent + results.failed);

        let whatsapp: Vec<_> = h
            .messages()
            .await
            .into_iter()
            .filter(|m| m.channel == Channel::WhatsApp)
            .collect();
        assert_eq!(whatsapp.len(), 1);
        assert_eq!(whatsapp[0].template_id.as_deref(), Some("tpl-health"));
        assert_eq!(whatsapp[0].status, MessageStatus::Queued);
    }

    #[tokio::test]
    async fn hospital_owners_audience_uses_owner_directory() {
        let h = harness();
        h.repos.owners.insert(&owner("OWN1", Some("+1-555-0100"))).await.unwrap();
        h.repos.owners.insert(&owner("OWN2", None)).await.unwrap();
        h.repos.patients.insert(&patient("PAT1", None)).await.unwrap();

        let (_, results) = runner(&h)
            .launch(request("Hospital Owners", vec![Channel::Sms]))
            .await
            .unwrap();

        assert_eq!(results, CampaignResults { total: 1, sent: 1, failed: 0 });
    }

    #[tokio::test]
    async fn dispatch_failures_are_counted_and_do_not_abort() {
        let h = failing_harness();
        for id in ["PAT1", "PAT2", "PAT3"] {
            h.repos.patients.insert(&patient(id, None)).await.unwrap();
        }

        let (campaign, results) = runner(&h)
            .launch(request("All Patients", vec![Channel::Email, Channel::Sms]))
            .await
            .unwrap();

        assert_eq!(results, CampaignResults { total: 6, sent: 0, failed: 6 });
        assert_eq!(campaign.sent, 0);
    }

    #[tokio::test]
    async fn duplicate_channels_are_sent_once() {
        let h = harness();
        h.repos.patients.insert(&patient("PAT1", None)).await.unwrap();

        let (campaign, results) = runner(&h)
            .launch(request("All Patients", vec![Channel::Sms, Channel::Sms]))
            .await
            .unwrap();

        assert_eq!(campaign.channels, vec![Channel::Sms]);
        assert_eq!(results.total, 1);
    }

    #[tokio::test]
    async fn campaign_is_recorded_with_sent_count() {
        let h = harness();
        h.repos.patients.insert(&patient("PAT1", None)).await.unwrap();

        let (campaign, _) = runner(&h)
            .launch(request("All Patients", vec![Channel::Email]))
            .await
            .unwrap();

        let stored = h.repos.campaigns.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, campaign.id);
        assert_eq!(stored[0].sent, 1);
        assert!(campaign.id.starts_with("CAMP"));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_anything_is_stored() {
        let h = harness();
        let r = runner(&h);

        let unknown = r.launch(request("VIPs", vec![Channel::Email])).await;
        assert!(matches!(unknown, Err(CampaignError::Invalid(_))));

        let no_channels = r.launch(request("All Patients", vec![])).await;
        assert!(matches!(no_channels, Err(CampaignError::Invalid(_))));

        let mut blank = request("All Patients", vec![Channel::Email]);
        blank.message = "  ".into();
        assert!(matches!(r.launch(blank).await, Err(CampaignError::Invalid(_))));

        assert_eq!(h.repos.campaigns.count().await.unwrap(), 0);
    }
}
