//! Bus consumers: device metadata and viewed news.
//!
//! A consumer is a capability `{topic, process}`; dispatch is a registry keyed
//! by topic. Consumers are idempotent via dedup guards and tolerate replays.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;
use glacier_core::types::parse_utc_offset;

use crate::keys::news_seen_dupl_guard_key;
use crate::state::ServiceState;

/// One bus-topic handler.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    fn topic(&self) -> &str;

    async fn process(&self, key: &str, payload: &[u8]) -> Result<(), Error>;
}

/// Topic-keyed consumer dispatch.
#[derive(Default)]
pub struct ConsumerRegistry {
    by_topic: HashMap<String, Arc<dyn BusConsumer>>,
}

impl ConsumerRegistry {
    pub fn register(&mut self, consumer: Arc<dyn BusConsumer>) {
        self.by_topic.insert(consumer.topic().to_string(), consumer);
    }

    /// Route a message to its topic's consumer. Unknown topics are dropped.
    pub async fn dispatch(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), Error> {
        match self.by_topic.get(topic) {
            Some(consumer) => consumer.process(key, payload).await,
            None => {
                warn!(%topic, "no consumer registered, dropping message");
                Ok(())
            }
        }
    }
}

/// Applies `{userId, tz, systemName, readableVersion}` events to the record.
pub struct DeviceMetadataConsumer {
    pub state: Arc<ServiceState>,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceMetadata {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    tz: String,
    #[serde(default)]
    system_name: String,
    #[serde(default)]
    readable_version: String,
}

/// `"{lowercase-no-space system}:{version}"`, empty when both parts are empty.
fn sanitize_latest_device(system_name: &str, version: &str) -> String {
    let system = system_name.to_lowercase().replace(' ', "");
    let device = format!("{system}:{version}");
    if device == ":" {
        String::new()
    } else {
        device
    }
}

#[async_trait]
impl BusConsumer for DeviceMetadataConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn process(&self, _key: &str, payload: &[u8]) -> Result<(), Error> {
        let dm: DeviceMetadata = serde_json::from_slice(payload)
            .map_err(|err| Error::InvalidProperties(err.to_string()))?;
        if dm.user_id.is_empty() {
            return Err(Error::InvalidProperties("device metadata without userId".into()));
        }
        let tz = if dm.tz.is_empty() { "+00:00" } else { &dm.tz };
        let utc_offset = parse_utc_offset(tz)
            .ok_or_else(|| Error::InvalidProperties(format!("invalid timezone: {tz}")))?;

        let id = self.state.get_or_init_internal_id(&dm.user_id).await?;
        let mut usr = self
            .state
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        usr.utc_offset = utc_offset;
        usr.latest_device = sanitize_latest_device(&dm.system_name, &dm.readable_version);

        self.state.kv.save_user(&usr, WriteGuard::Unconditional).await
    }
}

/// Counts `{userId, newsId}` views exactly once per pair.
pub struct ViewedNewsConsumer {
    pub state: Arc<ServiceState>,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewedNews {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    news_id: String,
}

#[async_trait]
impl BusConsumer for ViewedNewsConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn process(&self, _key: &str, payload: &[u8]) -> Result<(), Error> {
        let vn: ViewedNews = serde_json::from_slice(payload)
            .map_err(|err| Error::InvalidProperties(err.to_string()))?;
        if vn.user_id.is_empty() {
            return Err(Error::InvalidProperties("viewed news without userId".into()));
        }

        let guard_key = news_seen_dupl_guard_key(&vn.user_id, &vn.news_id);
        let set = self
            .state
            .kv
            .set_nx(&guard_key, "", Some(self.state.cfg.mining_session_duration.min()))
            .await?;
        if !set {
            return Err(Error::Duplicate);
        }

        let result = async {
            let id = self.state.get_or_init_internal_id(&vn.user_id).await?;
            let mut usr = self
                .state
                .kv
                .get_user(id)
                .await?
                .ok_or(Error::RelationNotFound)?;
            usr.news_seen += 1;
            self.state.kv.save_user(&usr, WriteGuard::Unconditional).await
        }
        .await;

        if let Err(err) = result {
            let compensation = self.state.kv.del(&guard_key).await;
            return Err(err.with_compensation(compensation));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_string_is_sanitized() {
        assert_eq!(sanitize_latest_device("Android", "9.9.9.2637"), "android:9.9.9.2637");
        assert_eq!(sanitize_latest_device("iOS Beta", "17.0"), "iosbeta:17.0");
        assert_eq!(sanitize_latest_device("", ""), "");
    }

    #[test]
    fn tz_defaults_applied_upstream_parse() {
        assert_eq!(parse_utc_offset("+00:00"), Some(0));
        assert_eq!(parse_utc_offset("-03:30"), Some(-210));
    }
}
