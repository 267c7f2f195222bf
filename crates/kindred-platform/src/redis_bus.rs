use anyhow::Result;
use async_trait::async_trait;
use kindred_core::{NotificationEvent, NotificationSink};
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::debug;

pub const NOTIFICATIONS_CHANNEL: &str = "kindred.notifications";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize + Sync>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let receivers: i64 = connection.publish(channel, serialized).await?;
        debug!("published to {channel} ({receivers} subscribers)");
        Ok(())
    }
}

/// Notifications ride the bus as plain JSON on a well-known channel.
/// Delivery past the channel is somebody else's job.
#[async_trait]
impl NotificationSink for RedisBus {
    async fn notify(&self, event: NotificationEvent) -> Result<()> {
        self.publish_json(NOTIFICATIONS_CHANNEL, &event).await
    }
}
