// src/comms/dispatcher.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::gateway::ChannelGateway;
use crate::models::{Channel, Message, MessageStatus, OutboundMessage, Reachable};
use crate::store::{CommunicationLog, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("recipient has no {0} address")]
    MissingAddress(Channel),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("delivery queue is closed")]
    QueueClosed,
}

/// Second phase of a dispatch: what the provider did with a queued message.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    Sent {
        message_id: Uuid,
        channel: Channel,
        at: DateTime<Utc>,
    },
    Failed {
        message_id: Uuid,
        channel: Channel,
        reason: String,
    },
}

impl DeliveryEvent {
    pub fn message_id(&self) -> Uuid {
        match self {
            DeliveryEvent::Sent { message_id, .. } | DeliveryEvent::Failed { message_id, .. } => {
                *message_id
            }
        }
    }
}

struct DeliveryJob {
    message: Message,
}

/// Accepts messages for delivery and reports delivery asynchronously.
///
/// `enqueue` records the message as `queued` and returns at once; a background
/// worker hands it to the channel gateway, flips it to `sent` and publishes a
/// [`DeliveryEvent`].
#[derive(Clone)]
pub struct Dispatcher {
    log: Arc<dyn CommunicationLog>,
    jobs: mpsc::UnboundedSender<DeliveryJob>,
    events: broadcast::Sender<DeliveryEvent>,
}

impl Dispatcher {
    /// Must be called inside a tokio runtime; starts the delivery worker.
    pub fn spawn(log: Arc<dyn CommunicationLog>, gateway: Arc<dyn ChannelGateway>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);

        tokio::spawn(delivery_loop(rx, log.clone(), gateway, events.clone()));

        Self { log, jobs, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self, outbound), fields(channel = %outbound.channel))]
    pub async fn enqueue(&self, outbound: OutboundMessage) -> Result<Message, DispatchError> {
        let recipient = outbound.recipient.trim();
        if recipient.is_empty() {
            return Err(DispatchError::MissingAddress(outbound.channel));
        }

        let message = Message {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            channel: outbound.channel,
            subject: outbound.subject,
            body: outbound.body,
            template_id: outbound.template_id,
            status: MessageStatus::Queued,
            queued_at: Utc::now(),
            sent_at: None,
        };

        self.log.append(&message).await?;

        self.jobs
            .send(DeliveryJob {
                message: message.clone(),
            })
            .map_err(|_| DispatchError::QueueClosed)?;

        debug!(message_id = %message.id, "message queued");
        Ok(message)
    }

    /// Resolves the recipient's address for `channel` and enqueues `body`.
    pub async fn send_to<R: Reachable + ?Sized>(
        &self,
        recipient: &R,
        channel: Channel,
        body: &str,
        subject: &str,
        template_id: Option<String>,
    ) -> Result<Message, DispatchError> {
        let address = recipient
            .address_for(channel)
            .ok_or(DispatchError::MissingAddress(channel))?;

        let outbound = OutboundMessage::new(channel, address, body)
            .with_subject(subject)
            .with_template(template_id);

        self.enqueue(outbound).await
    }
}

async fn delivery_loop(
    mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    log: Arc<dyn CommunicationLog>,
    gateway: Arc<dyn ChannelGateway>,
    events: broadcast::Sender<DeliveryEvent>,
) {
    while let Some(job) = rx.recv().await {
        let log = log.clone();
        let gateway = gateway.clone();
        let events = events.clone();
        // Deliveries overlap; a slow channel never holds up a fast one.
        tokio::spawn(async move { deliver(job.message, log, gateway, events).await });
    }
    debug!("delivery queue closed");
}

async fn deliver(
    message: Message,
    log: Arc<dyn CommunicationLog>,
    gateway: Arc<dyn ChannelGateway>,
    events: broadcast::Sender<DeliveryEvent>,
) {
    if let Err(e) = gateway.deliver(&message).await {
        warn!(message_id = %message.id, channel = %message.channel, "delivery failed: {e}");
        let _ = events.send(DeliveryEvent::Failed {
            message_id: message.id,
            channel: message.channel,
            reason: e.to_string(),
        });
        return;
    }

    let at = Utc::now();
    match log.mark_sent(message.id, at).await {
        Ok(true) => {
            debug!(message_id = %message.id, channel = %message.channel, "message sent");
            let _ = events.send(DeliveryEvent::Sent {
                message_id: message.id,
                channel: message.channel,
                at,
            });
        }
        Ok(false) => debug!(message_id = %message.id, "message already marked sent"),
        Err(e) => warn!(message_id = %message.id, "could not record delivery: {e}"),
    }
}
