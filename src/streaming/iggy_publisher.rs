//! Apache Iggy event publisher implementation (C6).
//!
//! Implements the [`EventPublisher`] port using Apache Iggy as the
//! streaming backend, with a single `events` topic and a fixed JSON
//! message body (spec `§6`).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use iggy::client::{Client, MessageClient, StreamClient, TopicClient};
use iggy::clients::client::IggyClient;
use iggy::compression::compression_algorithm::CompressionAlgorithm;
use iggy::identifier::Identifier;
use iggy::messages::send_messages::{Message, Partitioning};
use iggy::models::header::{HeaderKey, HeaderValue};
use iggy::utils::expiry::IggyExpiry;
use iggy::utils::topic_size::MaxTopicSize;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::PublisherSettings;
use crate::error::{InfraError, Result};
use crate::ports::EventPublisher;
use crate::types::entities::DecodedEvent;

use super::topics::{STREAM_NAME, TopicConfig};

/// Wire body for a published event, matching spec `§6` field-for-field.
#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    chain_id: &'a str,
    contract_address: String,
    event_name: &'a str,
    block_number: u64,
    transaction_hash: &'a str,
    log_index: u64,
    args: &'a std::collections::BTreeMap<String, String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Apache Iggy-based event publisher.
///
/// Connects to an Iggy server and publishes relayed events to the single
/// `events` topic. Handles stream/topic creation lazily and retries
/// individual publishes with exponential backoff.
pub struct IggyPublisher {
    client: Arc<IggyClient>,
    stream_name: String,
    topic_name: String,
    topic_config: TopicConfig,
    max_retries: u32,
    publish_timeout: std::time::Duration,
    connected: AtomicBool,
    initialized: AtomicBool,
    init_lock: RwLock<()>,
}

impl std::fmt::Debug for IggyPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IggyPublisher")
            .field("stream_name", &self.stream_name)
            .field("topic_name", &self.topic_name)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl IggyPublisher {
    /// Create a new Iggy publisher from settings. Does not connect; call
    /// [`Self::connect`] or let it connect lazily on first publish.
    ///
    /// # Errors
    /// Returns an error if the client cannot be constructed.
    pub fn new(settings: &PublisherSettings) -> Result<Self> {
        let client = IggyClient::builder()
            .with_tcp()
            .with_server_address(settings.url.clone())
            .build()
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;

        Ok(Self {
            client: Arc::new(client),
            stream_name: settings.stream_name.clone(),
            topic_name: settings.topic_name.clone(),
            topic_config: TopicConfig::new(settings.topic_name.clone()),
            max_retries: settings.max_retries,
            publish_timeout: settings.publish_timeout(),
            connected: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            init_lock: RwLock::new(()),
        })
    }

    /// Connect to the Iggy server.
    ///
    /// # Errors
    /// Returns an error if the connection attempt fails.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        self.client
            .connect()
            .await
            .map_err(|e| InfraError::Publish { transient: true, source: Box::new(e) })?;
        self.connected.store(true, Ordering::SeqCst);
        info!(stream = %self.stream_name, "connected to Iggy server");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        let _guard = self.init_lock.write().await;
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        if !self.connected.load(Ordering::SeqCst) {
            self.connect().await?;
        }

        self.ensure_stream_exists().await?;
        self.ensure_topic_exists().await?;

        self.initialized.store(true, Ordering::SeqCst);
        info!(stream = %self.stream_name, topic = %self.topic_name, "initialized Iggy stream and topic");
        Ok(())
    }

    async fn ensure_stream_exists(&self) -> Result<()> {
        let stream_id = Identifier::from_str_value(&self.stream_name)
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;

        match self.client.get_stream(&stream_id).await {
            Ok(Some(_)) => {
                debug!(stream = %self.stream_name, "stream already exists");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                let err_str = e.to_string();
                if !err_str.contains("not found") && !err_str.contains("NotFound") {
                    return Err(InfraError::Publish { transient: true, source: Box::new(e) }.into());
                }
            }
        }

        match self.client.create_stream(&self.stream_name, Some(1)).await {
            Ok(_) => {
                info!(stream = %self.stream_name, "created Iggy stream");
                Ok(())
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("already exists") || err_str.contains("AlreadyExists") {
                    debug!(stream = %self.stream_name, "stream already exists (race)");
                    Ok(())
                } else {
                    Err(InfraError::Publish { transient: true, source: Box::new(e) }.into())
                }
            }
        }
    }

    async fn ensure_topic_exists(&self) -> Result<()> {
        let stream_id = Identifier::from_str_value(&self.stream_name)
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;
        let topic_id = Identifier::from_str_value(&self.topic_name)
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;

        match self.client.get_topic(&stream_id, &topic_id).await {
            Ok(Some(_)) => {
                debug!(topic = %self.topic_name, "topic already exists");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                let err_str = e.to_string();
                if !err_str.contains("not found") && !err_str.contains("NotFound") {
                    return Err(InfraError::Publish { transient: true, source: Box::new(e) }.into());
                }
            }
        }

        match self
            .client
            .create_topic(
                &stream_id,
                &self.topic_name,
                self.topic_config.partitions,
                CompressionAlgorithm::None,
                None,
                None,
                IggyExpiry::ServerDefault,
                MaxTopicSize::ServerDefault,
            )
            .await
        {
            Ok(_) => {
                info!(
                    topic = %self.topic_name,
                    partitions = self.topic_config.partitions,
                    "created Iggy topic"
                );
                Ok(())
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("already exists") || err_str.contains("AlreadyExists") {
                    debug!(topic = %self.topic_name, "topic already exists (race)");
                    Ok(())
                } else {
                    Err(InfraError::Publish { transient: true, source: Box::new(e) }.into())
                }
            }
        }
    }

    /// Build the fixed-framing message body for an event.
    fn build_message(chain_id: &str, event: &DecodedEvent) -> Result<Message> {
        let envelope = EventEnvelope {
            chain_id,
            contract_address: event.contract_address.to_string(),
            event_name: &event.event_name,
            block_number: event.block_number,
            transaction_hash: &event.transaction_hash,
            log_index: event.log_index,
            args: &event.args,
            timestamp: event.timestamp,
        };
        let payload = Bytes::from(
            serde_json::to_vec(&envelope)
                .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?,
        );

        // Message payload length is capped at u32::MAX by the Iggy wire
        // protocol; event payloads never approach that.
        #[allow(clippy::cast_possible_truncation)]
        let length = payload.len() as u32;

        let headers = build_headers(chain_id, &event.event_name);

        Ok(Message { id: 0, length, payload, headers })
    }

    /// Send one message to the events topic, retried with a `2^n` second
    /// backoff up to `max_retries`, each attempt bounded by `publish_timeout`.
    async fn send_with_retry(&self, mut message: Message) -> Result<String> {
        let stream_id = Identifier::from_str_value(&self.stream_name)
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;
        let topic_id = Identifier::from_str_value(&self.topic_name)
            .map_err(|e| InfraError::Publish { transient: false, source: Box::new(e) })?;

        let mut last_err: Option<Box<dyn std::error::Error + Send + Sync>> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = std::time::Duration::from_secs(2u64.saturating_pow(attempt));
                warn!(attempt, backoff_secs = backoff.as_secs(), "retrying publish");
                tokio::time::sleep(backoff).await;
            }

            let send = self.client.send_messages(
                &stream_id,
                &topic_id,
                &Partitioning::balanced(),
                std::slice::from_mut(&mut message),
            );

            match tokio::time::timeout(self.publish_timeout, send).await {
                Ok(Ok(())) => {
                    debug!(attempt, "published message to Iggy");
                    return Ok(format!("{}:{}", self.topic_name, message.id));
                }
                Ok(Err(e)) => last_err = Some(Box::new(e)),
                Err(_elapsed) => {
                    last_err = Some(Box::new(InfraError::Publish {
                        transient: true,
                        source: format!("publish attempt {attempt} timed out").into(),
                    }));
                }
            }
        }

        Err(InfraError::Publish {
            transient: true,
            source: last_err.unwrap_or_else(|| "publish exhausted retries".into()),
        }
        .into())
    }
}

/// Best-effort transport-level attributes carrying `chain_id`/`event_name`
/// so a downstream router can key on them without parsing the body.
fn build_headers(chain_id: &str, event_name: &str) -> Option<HashMap<HeaderKey, HeaderValue>> {
    let mut headers = HashMap::new();
    let chain_key = HeaderKey::new("chain_id").ok()?;
    let chain_value = HeaderValue::from_str(chain_id).ok()?;
    let event_key = HeaderKey::new("event_name").ok()?;
    let event_value = HeaderValue::from_str(event_name).ok()?;
    headers.insert(chain_key, chain_value);
    headers.insert(event_key, event_value);
    Some(headers)
}

#[async_trait]
impl EventPublisher for IggyPublisher {
    #[instrument(skip(self, event), fields(event_name = %event.event_name, chain_id))]
    async fn publish(&self, chain_id: &str, event: &DecodedEvent) -> Result<String> {
        self.ensure_initialized().await?;
        let message = Self::build_message(chain_id, event)?;
        self.send_with_retry(message).await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
