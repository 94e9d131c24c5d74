//! NATS publisher for estimate replies

use crate::types::estimate::EstimateReply;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes replies to the request's inbox, or to a fallback subject
#[derive(Clone)]
pub struct EstimateProducer {
    client: Client,
    subject: String,
}

impl EstimateProducer {
    /// Create a new estimate producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a reply
    pub async fn publish(&self, reply_to: Option<Subject>, reply: &EstimateReply) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;
        let target = reply_to.unwrap_or_else(|| Subject::from(self.subject.as_str()));

        self.client.publish(target.clone(), payload.into()).await?;

        debug!(
            request_id = %reply.request_id(),
            subject = %target,
            "Published estimate reply"
        );

        Ok(())
    }

    /// Get the fallback subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
