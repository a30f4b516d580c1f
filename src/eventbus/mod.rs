//! Event bus (Kafka): fire-and-forget analytics events on `search.events`
//! and `ask.events`, per spec §6. Emission failure is logged locally and
//! never propagated — the source's own route handlers treat the bus the
//! same way, minus its `"now()"` literal-string timestamp bug, which this
//! module does not inherit (timestamps are real `chrono::Utc::now()`).

use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const TOPIC_SEARCH_EVENTS: &str = "search.events";
pub const TOPIC_ASK_EVENTS: &str = "ask.events";

pub struct EventBus {
    client: Client,
}

impl EventBus {
    pub async fn connect(broker: &str) -> rskafka::client::error::Result<Self> {
        let client = ClientBuilder::new(vec![broker.to_string()]).build().await?;
        Ok(Self { client })
    }

    /// Emits a single JSON event to `topic`. Never returns an error to the
    /// caller: a failure to reach the broker, or the partition/topic not
    /// existing, is logged and swallowed (spec §4.6: "event-emission
    /// failure MUST NOT fail the request").
    pub async fn emit(&self, topic: &str, mut event: Value) -> bool {
        if let Value::Object(map) = &mut event {
            map.insert(
                "timestamp".to_string(),
                json!(chrono::Utc::now().to_rfc3339()),
            );
        }

        match self.publish(topic, &event).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("event-bus emit to {topic} failed, dropping: {err}");
                false
            }
        }
    }

    async fn publish(&self, topic: &str, event: &Value) -> anyhow::Result<()> {
        let partition_client = self.partition_client(topic).await?;
        let record = Record {
            key: None,
            value: Some(serde_json::to_vec(event)?),
            headers: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        };
        partition_client
            .produce(vec![record], Compression::NoCompression)
            .await?;
        Ok(())
    }

    async fn partition_client(&self, topic: &str) -> anyhow::Result<PartitionClient> {
        Ok(self
            .client
            .partition_client(topic, 0, UnknownTopicHandling::Retry)
            .await?)
    }
}

pub fn search_event(query: &str, result_count: usize) -> Value {
    json!({
        "event_type": "search",
        "query": query,
        "result_count": result_count,
    })
}

pub fn click_event(query: &str, doc_id: &str, chunk_id: &str) -> Value {
    json!({
        "event_type": "click",
        "query": query,
        "doc_id": doc_id,
        "chunk_id": chunk_id,
    })
}

pub fn feedback_event(query: &str, label: &str, doc_id: Option<&str>, chunk_id: Option<&str>) -> Value {
    json!({
        "event_type": "feedback",
        "query": query,
        "label": label,
        "doc_id": doc_id,
        "chunk_id": chunk_id,
    })
}

pub fn ask_event(question: &str, abstained: bool) -> Value {
    json!({
        "event_type": "answer",
        "question": question,
        "abstained": abstained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_event_shape() {
        let event = search_event("rust async", 5);
        assert_eq!(event["event_type"], "search");
        assert_eq!(event["result_count"], 5);
    }

    #[test]
    fn test_feedback_event_carries_optional_fields() {
        let event = feedback_event("q", "relevant", Some("d1"), None);
        assert_eq!(event["doc_id"], "d1");
        assert!(event["chunk_id"].is_null());
    }

    #[test]
    fn test_ask_event_shape() {
        let event = ask_event("what is rust", true);
        assert_eq!(event["event_type"], "answer");
        assert_eq!(event["abstained"], true);
    }
}
