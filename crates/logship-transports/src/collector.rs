// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport shipping aggregated counters and raw message batches to the
//! remote log collector.
//!
//! Two independent in-memory caches accumulate across drain cycles: numeric
//! counters keyed by `(code, second-offset bucket[, name][, payload])` per
//! tenant, and JSON-encoded transfer batches per tenant. Each cache is
//! flushed on its own tick multiple of the 100ms base interval. Every
//! successful post may carry back new sampling settings from the server,
//! which take effect immediately on this transport's private runtime copy.

use crate::collector_client::{CollectorClient, CollectorSettings, CounterMap, MessageMap};
use crate::encode::encode_for_transfer;
use crate::record::LogRecord;
use crate::registry::{TransportConfig, TransportContext};
use crate::telemetry;
use crate::writer::{BackgroundWriter, IoTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship::{EventCode, LogLevel, Transport, TransportError, TransportSettings};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

pub const TRANSPORT_TYPE_COLLECTOR: &str = "collector";

const COLLECTOR_TRANSPORT_NAME: &str = "CollectorTransport";
const COLLECTOR_IO_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_COUNTER_INTERVAL: i64 = 100;
const DEFAULT_MESSAGE_INTERVAL: i64 = 100;
// Cache caps: accumulation silently stops rather than growing unbounded.
const MAX_COUNTER_KEYS: usize = 1_000_000;
const MAX_BUFFERED_MESSAGES: usize = 200_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorTransportConfig {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(rename = "transportconfig", default)]
    pub settings: TransportSettings,
    pub tenant_id: Uuid,
    pub collector_url: String,
    #[serde(default)]
    pub send_raw_data: bool,
}

impl TransportConfig for CollectorTransportConfig {
    fn transport_type(&self) -> &'static str {
        TRANSPORT_TYPE_COLLECTOR
    }

    fn is_singleton(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.settings.required && self.collector_url.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing collector url".to_string(),
            ));
        }
        Ok(())
    }

    fn build(&self, context: &TransportContext) -> Box<dyn Transport> {
        Box::new(BackgroundWriter::new(CollectorTransport::new(
            self.clone(),
            context.clone(),
        )))
    }
}

pub struct CollectorTransport {
    config: CollectorTransportConfig,
    context: TransportContext,
    instance_id: Uuid,

    // Runtime copies the server may override; the parsed config is never
    // mutated.
    send_raw_data: bool,
    max_log_level: LogLevel,
    counter_interval: i64,
    message_interval: i64,
    counter_tick_count: i64,
    message_tick_count: i64,

    counters_map: CounterMap,
    counters_map_size: usize,
    batch_start: Option<DateTime<Utc>>,

    message_map: MessageMap,
    message_map_size: usize,

    client: Option<CollectorClient>,
    failed_calls: Arc<AtomicI64>,
}

impl CollectorTransport {
    pub fn new(config: CollectorTransportConfig, context: TransportContext) -> Self {
        let send_raw_data = config.send_raw_data;
        let max_log_level = config.settings.max_log_level;
        CollectorTransport {
            config,
            context,
            instance_id: Uuid::nil(),
            send_raw_data,
            max_log_level,
            counter_interval: DEFAULT_COUNTER_INTERVAL,
            message_interval: DEFAULT_MESSAGE_INTERVAL,
            counter_tick_count: 0,
            message_tick_count: 0,
            counters_map: CounterMap::new(),
            counters_map_size: 0,
            batch_start: None,
            message_map: MessageMap::new(),
            message_map_size: 0,
            client: None,
            failed_calls: Arc::new(AtomicI64::new(0)),
        }
    }

    fn apply_settings(&mut self, settings: CollectorSettings) {
        if !settings.update {
            return;
        }
        self.send_raw_data = settings.send_raw_data;
        self.max_log_level = settings.log_level;
        if settings.counters_interval > 1 {
            self.counter_interval = settings.counters_interval;
        }
        if settings.message_interval > 1 {
            self.message_interval = settings.message_interval;
        }
    }

    fn accumulate_counter(&mut self, record: &LogRecord, start_time: DateTime<Utc>) {
        let event = &record.event;
        if event.code == EventCode::NONE || self.counters_map_size >= MAX_COUNTER_KEYS {
            return;
        }

        // The first counter in a period anchors the time buckets.
        let batch_start = *self.batch_start.get_or_insert(start_time);
        let offset = (start_time - batch_start).num_seconds();

        let mut key = format!("{}_{}", event.code, offset);
        if event.code == EventCode::UNKNOWN {
            key = format!("{}_{}", key, event.name);
        }
        if !event.payload.is_empty() {
            key = format!("{}_{}", key, event.payload);
        }

        let tenant_id = event.tenant_id.unwrap_or(self.config.tenant_id);
        let tenant_counters = self.counters_map.entry(tenant_id).or_default();
        match tenant_counters.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(event.count);
                self.counters_map_size += 1;
            }
            Entry::Occupied(mut occupied) => *occupied.get_mut() += event.count,
        }
    }

    fn buffer_messages(&mut self, records: &[LogRecord]) {
        if !self.send_raw_data || self.message_map_size >= MAX_BUFFERED_MESSAGES {
            return;
        }
        let batches = encode_for_transfer(
            records,
            &self.context.region,
            &self.context.host,
            &self.context.service,
        );
        for batch in &batches {
            match serde_json::to_string(batch) {
                Ok(encoded) => {
                    self.message_map_size += batch.records.len();
                    self.message_map
                        .entry(batch.tenant_id)
                        .or_insert_with(|| Vec::with_capacity(10))
                        .push(encoded);
                }
                Err(err) => {
                    self.failed_calls.fetch_add(1, Ordering::Relaxed);
                    telemetry::inc_failed(COLLECTOR_TRANSPORT_NAME, "encode");
                    error!("Failed to encode transfer batch: {}", err);
                }
            }
        }
    }

    async fn send_counters(&mut self) {
        let Some(batch_start) = self.batch_start else {
            return;
        };
        let Some(client) = &self.client else {
            return;
        };
        match client
            .post_counters(
                &self.context.service,
                self.instance_id,
                batch_start,
                &self.counters_map,
            )
            .await
        {
            Ok(settings) => {
                let sent: usize = self.counters_map.values().map(|m| m.len()).sum();
                self.counters_map_size = self.counters_map_size.saturating_sub(sent);
                self.counters_map = CounterMap::new();
                self.batch_start = None;
                telemetry::inc_successful(COLLECTOR_TRANSPORT_NAME);
                self.apply_settings(settings);
            }
            Err(err) => {
                // Counters are retained and retried on the next interval.
                self.failed_calls.fetch_add(1, Ordering::Relaxed);
                telemetry::inc_failed(COLLECTOR_TRANSPORT_NAME, "post_counters");
                error!("Failed to post counters to collector: {}", err);
            }
        }
    }

    async fn send_messages(&mut self) {
        if !self.send_raw_data {
            return;
        }
        let messages = std::mem::take(&mut self.message_map);
        if messages.is_empty() {
            return;
        }
        let Some(client) = &self.client else {
            return;
        };
        match client
            .post_raw_logs(&self.context.service, self.instance_id, &messages)
            .await
        {
            Ok(settings) => {
                let sent: usize = messages.values().map(|m| m.len()).sum();
                self.message_map_size = self.message_map_size.saturating_sub(sent);
                telemetry::inc_successful(COLLECTOR_TRANSPORT_NAME);
                self.apply_settings(settings);
            }
            Err(err) => {
                // The swapped-out batch is dropped; best effort only.
                self.failed_calls.fetch_add(1, Ordering::Relaxed);
                telemetry::inc_failed(COLLECTOR_TRANSPORT_NAME, "post_raw_logs");
                error!("Failed to post raw logs to collector: {}", err);
            }
        }
    }
}

#[async_trait]
impl IoTransport for CollectorTransport {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        if self.context.service.is_empty() {
            return Err(TransportError::InvalidConfig(
                "invalid service name".to_string(),
            ));
        }
        self.instance_id = Uuid::new_v4();
        self.client = Some(CollectorClient::new(
            self.config.collector_url.clone(),
            self.config.tenant_id,
            self.context.auth_token.clone(),
        )?);
        Ok(self.config.settings)
    }

    async fn write_records(&mut self, records: Vec<LogRecord>, start_time: Option<DateTime<Utc>>) {
        if let Some(start_time) = start_time {
            for record in &records {
                self.accumulate_counter(record, start_time);
            }
            self.buffer_messages(&records);
        }

        // Sends happen on tick multiples of the base interval so the server
        // sees one aggregated post per period, however busy the queue is.
        if self.counter_tick_count > self.counter_interval {
            self.send_counters().await;
            self.counter_tick_count = 0;
        }
        if self.message_tick_count > self.message_interval {
            self.send_messages().await;
            self.message_tick_count = 0;
        }
        self.counter_tick_count += 1;
        self.message_tick_count += 1;
    }

    fn io_interval(&self) -> Duration {
        COLLECTOR_IO_INTERVAL
    }

    fn max_log_level(&self) -> LogLevel {
        self.max_log_level
    }

    fn transport_name(&self) -> &'static str {
        COLLECTOR_TRANSPORT_NAME
    }

    fn required(&self) -> bool {
        self.config.settings.required
    }

    fn supports_counters(&self) -> bool {
        true
    }

    async fn flush_io(&mut self) {
        self.send_counters().await;
        self.send_messages().await;
    }

    async fn close_io(&mut self) {
        self.send_counters().await;
        self.send_messages().await;
    }

    fn failed_calls(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.failed_calls)
    }
}
