use lapin::options::QueueDeclareOptions;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, Error as LapinError};

use crate::config::BrokerConfig;
use crate::error::GatewayError;

pub const QUEUE_AGENT_TASKS: &str = "agent.tasks";
pub const QUEUE_AGENT_RESULTS: &str = "agent.results";
pub const QUEUE_AGENT_DLQ: &str = "agent.dlq";

/// Declares every queue the platform depends on. Idempotent: a queue
/// already declared with identical arguments is a no-op; a conflicting
/// redeclaration surfaces as [`GatewayError::TopologyConflict`] so the
/// caller can log and continue rather than crash the whole process.
pub async fn declare_topology(channel: &Channel, config: &BrokerConfig) -> Result<(), GatewayError> {
    declare_queue(channel, QUEUE_AGENT_DLQ, FieldTable::default()).await?;

    let mut workflow_args = FieldTable::default();
    workflow_args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from("")),
    );
    workflow_args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(QUEUE_AGENT_DLQ)),
    );
    workflow_args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongLongInt(300_000),
    );
    declare_queue(channel, &config.workflow_messages_queue, workflow_args).await?;

    let mut task_args = quorum_bounded_args(QUEUE_AGENT_DLQ);
    task_args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongLongInt(300_000),
    );
    declare_queue(channel, QUEUE_AGENT_TASKS, task_args).await?;

    declare_queue(channel, QUEUE_AGENT_RESULTS, FieldTable::default()).await?;

    let metrics_args = quorum_bounded_args(QUEUE_AGENT_DLQ);
    declare_queue(channel, &config.metrics_queue, metrics_args).await?;

    Ok(())
}

fn quorum_bounded_args(dlq: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from("")),
    );
    args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(dlq)),
    );
    args.insert(
        ShortString::from("x-queue-type"),
        AMQPValue::LongString(LongString::from("quorum")),
    );
    args.insert(
        ShortString::from("x-max-length"),
        AMQPValue::LongLongInt(10_000),
    );
    args.insert(
        ShortString::from("x-max-length-bytes"),
        AMQPValue::LongLongInt(104_857_600),
    );
    args.insert(
        ShortString::from("x-overflow"),
        AMQPValue::LongString(LongString::from("reject-publish")),
    );
    args
}

async fn declare_queue(
    channel: &Channel,
    name: &str,
    args: FieldTable,
) -> Result<(), GatewayError> {
    let result = channel
        .queue_declare(
            name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => match &err {
            LapinError::ProtocolError(_) => Err(GatewayError::TopologyConflict {
                queue: name.to_string(),
                source: err,
            }),
            _ => Err(GatewayError::Transient(err)),
        },
    }
}
