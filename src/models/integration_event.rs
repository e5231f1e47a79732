use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub target: Option<String>,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub processed: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl IntegrationEvent {
    pub fn new(event_type: &str, source: &str, data: Value, target: Option<String>) -> Self {
        IntegrationEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            target,
            data,
            timestamp: OffsetDateTime::now_utc(),
            processed: false,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// An event that exhausted its processing attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDeadLetter {
    pub id: Uuid,
    pub event: IntegrationEvent,
    pub error: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub target: Option<String>,
}
