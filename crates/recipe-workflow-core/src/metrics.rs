use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::envelope::{Envelope, EnvelopeType};

/// A single observability event, constructed by any component and handed
/// to the metrics publisher. Non-JSON-native values must be stringified
/// before being placed in `metadata` — there is no runtime type check,
/// only these constructor helpers.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<f64>,
    pub metadata: Map<String, Value>,
}

impl MetricEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            duration: None,
            metadata: Map::new(),
        }
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration = Some(duration_secs);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn into_envelope(self) -> Envelope {
        let mut payload = Map::new();
        payload.insert("event_type".to_string(), Value::String(self.event_type));
        if let Some(duration) = self.duration {
            payload.insert(
                "duration".to_string(),
                serde_json::Number::from_f64(duration)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        }
        payload.insert("metadata".to_string(), Value::Object(self.metadata));
        Envelope::new(EnvelopeType::Metric, Value::Object(payload))
    }
}
