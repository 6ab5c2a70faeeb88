// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured console output: one JSON object per record, written to the
//! error stream so it never interleaves with application stdout.
//!
//! The flush interval is very short (10ms) because the wrapper drops events
//! rather than buffering unboundedly when this backend falls behind.

use crate::registry::{TransportConfig, TransportContext};
use crate::record::LogRecord;
use crate::telemetry;
use crate::writer::{BackgroundWriter, IoTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship::{EventCode, LogLevel, Transport, TransportError, TransportSettings};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

pub const TRANSPORT_TYPE_JSONLINES: &str = "jsonlines";

const JSONLINES_TRANSPORT_NAME: &str = "JsonLinesTransport";
const JSONLINES_IO_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonLinesTransportConfig {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(rename = "transportconfig", default)]
    pub settings: TransportSettings,
}

impl TransportConfig for JsonLinesTransportConfig {
    fn transport_type(&self) -> &'static str {
        TRANSPORT_TYPE_JSONLINES
    }

    fn is_singleton(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn build(&self, context: &TransportContext) -> Box<dyn Transport> {
        Box::new(BackgroundWriter::new(JsonLinesTransport::new(
            self.clone(),
            context.service.clone(),
        )))
    }
}

/// Wire shape of one console line.
#[derive(Debug, Serialize)]
struct JsonLineRecord<'a> {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    service: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "is_none_code")]
    code: EventCode,
}

fn is_none_code(code: &EventCode) -> bool {
    *code == EventCode::NONE
}

pub struct JsonLinesTransport {
    config: JsonLinesTransportConfig,
    service: String,
    failed_calls: Arc<AtomicI64>,
}

impl JsonLinesTransport {
    pub fn new(config: JsonLinesTransportConfig, service: String) -> Self {
        JsonLinesTransport {
            config,
            service,
            failed_calls: Arc::new(AtomicI64::new(0)),
        }
    }
}

#[async_trait]
impl IoTransport for JsonLinesTransport {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        Ok(self.config.settings)
    }

    async fn write_records(&mut self, records: Vec<LogRecord>, _start_time: Option<DateTime<Utc>>) {
        if records.is_empty() {
            return;
        }
        let mut buffer = Vec::with_capacity(records.len() * 128);
        for record in &records {
            let line = JsonLineRecord {
                timestamp: record.timestamp,
                level: record.event.log_level,
                service: &self.service,
                message: &record.event.message,
                request_id: record.event.request_id,
                tenant_id: record.event.tenant_id,
                code: record.event.code,
            };
            match serde_json::to_vec(&line) {
                Ok(encoded) => {
                    buffer.extend_from_slice(&encoded);
                    buffer.push(b'\n');
                }
                Err(err) => {
                    self.failed_calls
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    telemetry::inc_failed(JSONLINES_TRANSPORT_NAME, "encode");
                    error!("Failed to encode console record: {}", err);
                }
            }
        }
        let mut stderr = tokio::io::stderr();
        if let Err(err) = stderr.write_all(&buffer).await {
            self.failed_calls
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            telemetry::inc_failed(JSONLINES_TRANSPORT_NAME, "write");
            error!("Failed to write console records: {}", err);
        }
    }

    fn io_interval(&self) -> Duration {
        JSONLINES_IO_INTERVAL
    }

    fn max_log_level(&self) -> LogLevel {
        self.config.settings.max_log_level
    }

    fn transport_name(&self) -> &'static str {
        JSONLINES_TRANSPORT_NAME
    }

    fn required(&self) -> bool {
        self.config.settings.required
    }

    fn supports_counters(&self) -> bool {
        false
    }

    async fn flush_io(&mut self) {
        let _ = tokio::io::stderr().flush().await;
    }

    async fn close_io(&mut self) {
        self.flush_io().await;
    }

    fn failed_calls(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.failed_calls)
    }
}
