use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::envelope::{Envelope, EnvelopeType, ErrorDetail};
use crate::error::ValidationError;

/// `recipe_workflow_full`'s payload. `number_of_urls == 0` is a valid,
/// deliberately empty search (distinct from the field being absent, which
/// defaults to 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInitiatePayload {
    pub search_query: String,
    #[serde(default)]
    pub excluded_domains: Vec<String>,
    #[serde(default = "default_number_of_urls")]
    pub number_of_urls: u32,
}

fn default_number_of_urls() -> u32 {
    10
}

/// Typed view of an envelope's payload, produced only by
/// [`SchemaTable::validate`].
#[derive(Debug, Clone)]
pub enum Payload {
    WorkflowInitiate {
        workflow_type: String,
        payload: WorkflowInitiatePayload,
    },
    AgentTask {
        workflow_type: String,
        workflow_payload: Value,
        target_agent_id: Option<String>,
    },
    AgentResult {
        task_id: Uuid,
        output: Value,
        error: Option<ErrorDetail>,
    },
    Metric {
        event_type: String,
        duration: Option<f64>,
        metadata: Value,
    },
}

/// The recognized `workflow_type` values and the envelope-level types,
/// kept in one place so every consumer validates against the same rules.
/// Built to be extended (see [`SchemaTable::register`]) even though only
/// `recipe_workflow_full` ships today.
pub struct SchemaTable {
    known_workflow_types: Vec<&'static str>,
}

impl Default for SchemaTable {
    fn default() -> Self {
        Self {
            known_workflow_types: vec!["recipe_workflow_full"],
        }
    }
}

impl SchemaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow_type: &'static str) {
        if !self.known_workflow_types.contains(&workflow_type) {
            self.known_workflow_types.push(workflow_type);
        }
    }

    /// Validates an envelope against its declared type and, for
    /// `workflow.initiate`, the embedded `workflow_type`'s schema.
    pub fn validate(&self, envelope: &Envelope) -> Result<Payload, ValidationError> {
        match envelope.envelope_type {
            EnvelopeType::WorkflowInitiate => self.validate_workflow_initiate(envelope),
            EnvelopeType::AgentTask => self.validate_agent_task(envelope),
            EnvelopeType::AgentResult => self.validate_agent_result(envelope),
            EnvelopeType::Metric => self.validate_metric(envelope),
        }
    }

    fn validate_workflow_initiate(&self, envelope: &Envelope) -> Result<Payload, ValidationError> {
        let workflow_type = envelope
            .payload
            .get("workflow_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "workflow_type".to_string(),
                context: "workflow.initiate".to_string(),
            })?
            .to_string();

        if !self.known_workflow_types.contains(&workflow_type.as_str()) {
            return Err(ValidationError::UnknownWorkflowType(workflow_type));
        }

        let raw = envelope
            .payload
            .get("workflow_payload")
            .cloned()
            .unwrap_or(Value::Null);

        let payload: WorkflowInitiatePayload = serde_json::from_value(raw)?;

        if payload.search_query.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "search_query".to_string(),
                context: workflow_type,
            });
        }
        if payload.number_of_urls > 50 {
            return Err(ValidationError::OutOfRange {
                field: "number_of_urls".to_string(),
                reason: "must be <= 50".to_string(),
            });
        }

        Ok(Payload::WorkflowInitiate {
            workflow_type,
            payload,
        })
    }

    fn validate_agent_task(&self, envelope: &Envelope) -> Result<Payload, ValidationError> {
        let workflow_type = envelope
            .payload
            .get("workflow_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "workflow_type".to_string(),
                context: "agent.task".to_string(),
            })?
            .to_string();
        let workflow_payload = envelope
            .payload
            .get("workflow_payload")
            .cloned()
            .ok_or_else(|| ValidationError::MissingField {
                field: "workflow_payload".to_string(),
                context: "agent.task".to_string(),
            })?;
        let target_agent_id = envelope
            .payload
            .get("target_agent_id")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        Ok(Payload::AgentTask {
            workflow_type,
            workflow_payload,
            target_agent_id,
        })
    }

    fn validate_agent_result(&self, envelope: &Envelope) -> Result<Payload, ValidationError> {
        let task_id = envelope
            .payload
            .get("task_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "task_id".to_string(),
                context: "agent.result".to_string(),
            })?;
        let task_id = Uuid::parse_str(task_id).map_err(|_| ValidationError::OutOfRange {
            field: "task_id".to_string(),
            reason: "not a valid UUID".to_string(),
        })?;
        let output = envelope
            .payload
            .get("output")
            .cloned()
            .unwrap_or(Value::Null);
        let error = envelope
            .payload
            .get("error")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?;

        Ok(Payload::AgentResult {
            task_id,
            output,
            error,
        })
    }

    fn validate_metric(&self, envelope: &Envelope) -> Result<Payload, ValidationError> {
        let event_type = envelope
            .payload
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "event_type".to_string(),
                context: "metric".to_string(),
            })?
            .to_string();
        let duration = envelope.payload.get("duration").and_then(Value::as_f64);
        let metadata = envelope
            .payload
            .get("metadata")
            .cloned()
            .unwrap_or(Value::Null);

        Ok(Payload::Metric {
            event_type,
            duration,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn initiate(payload: Value) -> Envelope {
        Envelope::new(EnvelopeType::WorkflowInitiate, payload)
    }

    #[test]
    fn accepts_known_workflow_type() {
        let table = SchemaTable::new();
        let env = initiate(json!({
            "workflow_type": "recipe_workflow_full",
            "workflow_payload": { "search_query": "lasagna" }
        }));
        let payload = table.validate(&env).expect("should validate");
        match payload {
            Payload::WorkflowInitiate { workflow_type, payload } => {
                assert_eq!(workflow_type, "recipe_workflow_full");
                assert_eq!(payload.number_of_urls, 10);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_workflow_type() {
        let table = SchemaTable::new();
        let env = initiate(json!({
            "workflow_type": "nonexistent",
            "workflow_payload": { "search_query": "lasagna" }
        }));
        assert!(matches!(
            table.validate(&env),
            Err(ValidationError::UnknownWorkflowType(_))
        ));
    }

    #[test]
    fn rejects_missing_search_query() {
        let table = SchemaTable::new();
        let env = initiate(json!({
            "workflow_type": "recipe_workflow_full",
            "workflow_payload": {}
        }));
        assert!(table.validate(&env).is_err());
    }

    #[test]
    fn number_of_urls_zero_is_valid() {
        let table = SchemaTable::new();
        let env = initiate(json!({
            "workflow_type": "recipe_workflow_full",
            "workflow_payload": { "search_query": "lasagna", "number_of_urls": 0 }
        }));
        let payload = table.validate(&env).expect("zero urls is valid");
        match payload {
            Payload::WorkflowInitiate { payload, .. } => assert_eq!(payload.number_of_urls, 0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_number_of_urls_over_fifty() {
        let table = SchemaTable::new();
        let env = initiate(json!({
            "workflow_type": "recipe_workflow_full",
            "workflow_payload": { "search_query": "lasagna", "number_of_urls": 51 }
        }));
        assert!(matches!(
            table.validate(&env),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
