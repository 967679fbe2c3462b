// src/comms/gateway.rs

use async_trait::async_trait;

use crate::models::{Channel, ChannelLatencies, Message};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{channel} provider rejected message: {reason}")]
    Rejected { channel: Channel, reason: String },
}

/// The provider side of a channel (WhatsApp Business, SMS carrier, SMTP relay).
/// Resolves once the provider has accepted the message for the recipient.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), GatewayError>;
}

/// Stands in for real providers: every message is delivered after a fixed
/// per-channel latency.
pub struct SimulatedGateway {
    latencies: ChannelLatencies,
}

impl SimulatedGateway {
    pub fn new(latencies: ChannelLatencies) -> Self {
        Self { latencies }
    }
}

#[async_trait]
impl ChannelGateway for SimulatedGateway {
    async fn deliver(&self, message: &Message) -> Result<(), GatewayError> {
        tokio::time::sleep(self.latencies.for_channel(message.channel)).await;
        tracing::trace!(message_id = %message.id, channel = %message.channel, "simulated delivery");
        Ok(())
    }
}
