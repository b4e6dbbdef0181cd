//! Producer: turns application records into `ProduceRequest`s, resolves the
//! partition leader through the Metadata Cache, and surfaces results.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::error::{Error, Result};
use super::metadata_cache::MetadataCache;
use crate::backoff::{Backoff, BackoffConfig};
use crate::connection::{BrokerConnector, DEFAULT_MAX_IN_FLIGHT};
use crate::protocol::message::{Message, MessageSet};
use crate::protocol::messages::{ProduceRequest, ProduceRequestPartition, ProduceRequestTopic};
use crate::throttle::maybe_throttle;

/// Default from the external-interfaces configuration table.
const DEFAULT_TIMEOUT_MS: i32 = 30_000;
const DEFAULT_MAX_REQUEST_SIZE: usize = 1_048_576;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// `-1` all in-sync replicas, `0` fire-and-forget, `1` leader only.
    pub acks: i16,
    pub timeout_ms: i32,
    pub retries: usize,
    pub max_request_size: usize,
    /// Bounds how many requests a single Broker Connection holds pending at
    /// once, shared across every `Producer` built from the same `Client`.
    pub max_in_flight_requests_per_connection: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            acks: 1,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: 0,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            max_in_flight_requests_per_connection: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// An immutable application record to be sent.
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: i32,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResult {
    pub topic: String,
    pub partition: i32,
    /// `-1` when `acks = 0`, since no response is ever awaited.
    pub offset: i64,
    /// `-1` when `acks = 0`.
    pub timestamp: i64,
}

pub struct Producer {
    brokers: Arc<BrokerConnector>,
    metadata: Arc<MetadataCache>,
    config: ProducerConfig,
    backoff_config: Arc<BackoffConfig>,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Producer {
    pub(crate) fn new(
        brokers: Arc<BrokerConnector>,
        metadata: Arc<MetadataCache>,
        config: ProducerConfig,
        backoff_config: Arc<BackoffConfig>,
    ) -> Self {
        Self {
            brokers,
            metadata,
            config,
            backoff_config,
        }
    }

    /// Implements the nine-step send algorithm: serialize, resolve leader,
    /// dispatch, and retry retriable routing errors up to `config.retries`
    /// times with a refreshed metadata snapshot.
    pub async fn send(&self, record: ProducerRecord) -> Result<ProduceResult> {
        let timestamp = record
            .timestamp
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let message = Message::new(timestamp, record.key.clone(), record.value.clone());
        let message_set = MessageSet::single(message).encode()?;

        if message_set.len() > self.config.max_request_size {
            return Err(Error::MessageTooLarge {
                size: message_set.len(),
                max: self.config.max_request_size,
            });
        }

        let mut backoff = Backoff::new(&self.backoff_config);
        let mut attempt = 0usize;

        loop {
            match self.try_send(&record, &message_set).await {
                Ok(result) => return Ok(result),
                Err(e) if e.retriable() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        attempt,
                        error = %e,
                        "retriable produce error, invalidating cached metadata",
                    );
                    self.metadata.invalidate(std::slice::from_ref(&record.topic));
                    tokio::time::sleep(backoff.next_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_send(&self, record: &ProducerRecord, message_set: &[u8]) -> Result<ProduceResult> {
        let meta = self.metadata.fetch_topics(&[record.topic.clone()]).await?;

        let topic = meta.topics.get(&record.topic).ok_or_else(|| Error::NoLeader {
            topic: record.topic.clone(),
            partition: record.partition,
        })?;

        let partition = topic
            .partitions
            .get(&record.partition)
            .ok_or_else(|| Error::NoLeader {
                topic: record.topic.clone(),
                partition: record.partition,
            })?;

        if partition.is_unavailable() {
            return Err(Error::NoLeader {
                topic: record.topic.clone(),
                partition: record.partition,
            });
        }

        let leader_id = partition.leader_id;
        let messenger = self.brokers.connect(leader_id).await?;

        // Measured from first byte written, per the Broker Connection's
        // per-request timeout contract; a small margin over the broker-side
        // `timeout_ms` avoids racing a response the broker is still in the
        // process of sending.
        let request_timeout = Duration::from_millis(self.config.timeout_ms as u64) + Duration::from_secs(5);

        let request = ProduceRequest {
            acks: self.config.acks,
            timeout_ms: self.config.timeout_ms,
            topics: vec![ProduceRequestTopic {
                topic: record.topic.clone(),
                partitions: vec![ProduceRequestPartition {
                    partition: record.partition,
                    message_set: message_set.to_vec(),
                }],
            }],
        };

        if self.config.acks == 0 {
            messenger.request_fire_and_forget(&request).await?;
            return Ok(ProduceResult {
                topic: record.topic.clone(),
                partition: record.partition,
                offset: -1,
                timestamp: -1,
            });
        }

        let response = messenger.request(&request, request_timeout).await?;

        match maybe_throttle::<Error>(Some(response.throttle_time_ms)) {
            Ok(()) => {}
            Err(crate::backoff::ErrorOrThrottle::Throttle(d)) => {
                debug!(millis = d.as_millis() as u64, "broker requested throttle");
                tokio::time::sleep(d).await;
            }
            Err(crate::backoff::ErrorOrThrottle::Error(e)) => return Err(e),
        }

        let topic_response = response
            .topics
            .into_iter()
            .find(|t| t.topic == record.topic)
            .ok_or_else(|| Error::InvalidResponse(format!("topic {} missing from produce response", record.topic)))?;

        let partition_response = topic_response
            .partitions
            .into_iter()
            .find(|p| p.partition == record.partition)
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "partition {} missing from produce response for {}",
                    record.partition, record.topic
                ))
            })?;

        match partition_response.error {
            None => Ok(ProduceResult {
                topic: record.topic.clone(),
                partition: record.partition,
                offset: partition_response.base_offset,
                timestamp: partition_response.log_append_time,
            }),
            Some(protocol_error) => Err(Error::ServerError {
                protocol_error,
                topic: record.topic.clone(),
                partition: record.partition,
            }),
        }
    }
}
