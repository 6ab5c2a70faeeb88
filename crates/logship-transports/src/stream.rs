// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport feeding encoded transfer batches into a partitioned stream.
//!
//! On startup the stream is verified (and created if absent) and a synthetic
//! record is written so a misconfigured endpoint fails init instead of
//! silently dropping traffic. Each drain cycle encodes the records into
//! per-tenant batches and puts them in sub-batches; a failed put aborts the
//! cycle so record order within the stream is never scrambled.

use crate::encode::encode_for_transfer;
use crate::record::LogRecord;
use crate::registry::{TransportConfig, TransportContext};
use crate::stream_client::{PutRecordsEntry, StreamClient, STREAM_STATUS_ACTIVE};
use crate::telemetry;
use crate::writer::{BackgroundWriter, IoTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship::{LogEvent, LogLevel, Transport, TransportError, TransportSettings};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};

pub const TRANSPORT_TYPE_STREAM: &str = "stream";

const STREAM_TRANSPORT_NAME: &str = "StreamTransport";
const STREAM_IO_INTERVAL: Duration = Duration::from_secs(1);
/// Transfer units per put call; the service rejects larger requests.
const MAX_STREAM_RECORDS_PER_BATCH: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTransportConfig {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(rename = "transportconfig", default)]
    pub settings: TransportSettings,
    pub endpoint: String,
    pub stream_name: String,
    pub region: String,
    #[serde(default = "default_shard_count")]
    pub shard_count: i32,
    /// Optional local mirror of everything put on the stream.
    #[serde(default)]
    pub filename: String,
}

fn default_shard_count() -> i32 {
    1
}

impl TransportConfig for StreamTransportConfig {
    fn transport_type(&self) -> &'static str {
        TRANSPORT_TYPE_STREAM
    }

    fn is_singleton(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), TransportError> {
        if !self.settings.required {
            return Ok(());
        }
        if self.endpoint.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing stream endpoint".to_string(),
            ));
        }
        if self.stream_name.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing stream name".to_string(),
            ));
        }
        if !self.region.starts_with("aws-") {
            return Err(TransportError::InvalidConfig(format!(
                "logging config invalid - unrecognized region {}",
                self.region
            )));
        }
        if self.shard_count < 1 {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - shard count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn build(&self, context: &TransportContext) -> Box<dyn Transport> {
        Box::new(BackgroundWriter::new(StreamTransport::new(
            self.clone(),
            context.clone(),
        )))
    }
}

pub struct StreamTransport {
    config: StreamTransportConfig,
    context: TransportContext,
    client: Option<StreamClient>,
    mirror: Option<BufWriter<File>>,
    failed_calls: Arc<AtomicI64>,
}

impl StreamTransport {
    pub fn new(config: StreamTransportConfig, context: TransportContext) -> Self {
        StreamTransport {
            config,
            context,
            client: None,
            mirror: None,
            failed_calls: Arc::new(AtomicI64::new(0)),
        }
    }

    async fn ensure_stream(&self, client: &StreamClient) -> Result<(), TransportError> {
        match client.describe_stream(&self.config.stream_name).await? {
            Some(description) if description.status == STREAM_STATUS_ACTIVE => Ok(()),
            Some(_) => client.wait_until_active(&self.config.stream_name).await,
            None => {
                info!(
                    "Stream {} not found, creating with {} shards",
                    self.config.stream_name, self.config.shard_count
                );
                client
                    .create_stream(&self.config.stream_name, self.config.shard_count)
                    .await?;
                client.wait_until_active(&self.config.stream_name).await
            }
        }
    }

    async fn mirror_line(&mut self, line: &str) {
        if let Some(mirror) = self.mirror.as_mut() {
            if let Err(err) = mirror.write_all(line.as_bytes()).await {
                error!("Failed to mirror stream batch: {}", err);
            } else if let Err(err) = mirror.write_all(b"\n").await {
                error!("Failed to mirror stream batch: {}", err);
            }
        }
    }

    fn record_failure(&self, op: &'static str, err: &TransportError) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        telemetry::inc_failed(STREAM_TRANSPORT_NAME, op);
        error!("Stream transport {} failed: {}", op, err);
    }
}

#[async_trait]
impl IoTransport for StreamTransport {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        let client = StreamClient::new(self.config.endpoint.clone())?;
        self.ensure_stream(&client).await?;

        // A synthetic record proves the stream is writable before any real
        // traffic is accepted.
        let probe = LogRecord::new(LogEvent::message(
            LogLevel::Info,
            format!("{} starting on {}", self.context.service, self.context.host),
        ));
        let batches = encode_for_transfer(
            std::slice::from_ref(&probe),
            &self.config.region,
            &self.context.host,
            &self.context.service,
        );
        let data = serde_json::to_string(&batches[0])?;
        client
            .put_records(
                &self.config.stream_name,
                &[PutRecordsEntry {
                    data,
                    partition_key: probe.timestamp.to_rfc3339(),
                }],
            )
            .await?;

        if !self.config.filename.is_empty() {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.config.filename)
                .await?;
            self.mirror = Some(BufWriter::new(file));
        }
        self.client = Some(client);
        Ok(self.config.settings)
    }

    async fn write_records(&mut self, records: Vec<LogRecord>, start_time: Option<DateTime<Utc>>) {
        if records.is_empty() {
            return;
        }
        let partition_key = start_time.unwrap_or_else(Utc::now).to_rfc3339();
        let batches = encode_for_transfer(
            &records,
            &self.config.region,
            &self.context.host,
            &self.context.service,
        );

        let mut entries = Vec::with_capacity(batches.len());
        for batch in &batches {
            match serde_json::to_string(batch) {
                Ok(data) => {
                    self.mirror_line(&data).await;
                    entries.push(PutRecordsEntry {
                        data,
                        partition_key: partition_key.clone(),
                    });
                }
                Err(err) => {
                    self.failed_calls.fetch_add(1, Ordering::Relaxed);
                    telemetry::inc_failed(STREAM_TRANSPORT_NAME, "encode");
                    error!("Failed to encode transfer batch: {}", err);
                }
            }
        }
        if let Some(mirror) = self.mirror.as_mut() {
            if let Err(err) = mirror.flush().await {
                error!("Failed to flush stream mirror: {}", err);
            }
        }

        let Some(client) = &self.client else {
            return;
        };
        for chunk in entries.chunks(MAX_STREAM_RECORDS_PER_BATCH) {
            if let Err(err) = client.put_records(&self.config.stream_name, chunk).await {
                // The rest of the cycle is abandoned; retrying out of order
                // would scramble the stream.
                self.record_failure("put_records", &err);
                return;
            }
            telemetry::inc_successful(STREAM_TRANSPORT_NAME);
        }
    }

    fn io_interval(&self) -> Duration {
        STREAM_IO_INTERVAL
    }

    fn max_log_level(&self) -> LogLevel {
        self.config.settings.max_log_level
    }

    fn transport_name(&self) -> &'static str {
        STREAM_TRANSPORT_NAME
    }

    fn required(&self) -> bool {
        self.config.settings.required
    }

    fn supports_counters(&self) -> bool {
        true
    }

    async fn flush_io(&mut self) {
        if let Some(mirror) = self.mirror.as_mut() {
            if let Err(err) = mirror.flush().await {
                error!("Failed to flush stream mirror: {}", err);
            }
        }
    }

    async fn close_io(&mut self) {
        self.flush_io().await;
        self.mirror = None;
        self.client = None;
    }

    fn failed_calls(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.failed_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_client::{DESCRIBE_STREAM_PATH, PUT_RECORDS_PATH};
    use uuid::Uuid;

    fn config_with_endpoint(endpoint: &str) -> StreamTransportConfig {
        StreamTransportConfig {
            transport_type: TRANSPORT_TYPE_STREAM.to_string(),
            settings: TransportSettings {
                required: true,
                max_log_level: LogLevel::Debug,
            },
            endpoint: endpoint.to_string(),
            stream_name: "idp.log".to_string(),
            region: "aws-us-east-1".to_string(),
            shard_count: 1,
            filename: String::new(),
        }
    }

    fn context() -> TransportContext {
        TransportContext {
            service: "idp".to_string(),
            host: "host-1".to_string(),
            region: "aws-us-east-1".to_string(),
            auth_token: None,
        }
    }

    async fn mock_active_stream(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", DESCRIBE_STREAM_PATH)
            .with_status(200)
            .with_body(r#"{"name":"idp.log","status":"ACTIVE","shard_count":1}"#)
            .create_async()
            .await
    }

    #[test]
    fn test_validate_rejects_bad_region() {
        let mut config = config_with_endpoint("http://localhost:1");
        config.region = "mars-olympus-1".to_string();
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_skipped_when_optional() {
        let mut config = config_with_endpoint("");
        config.settings.required = false;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_init_writes_probe_record() {
        let mut server = mockito::Server::new_async().await;
        let _describe = mock_active_stream(&mut server).await;
        let put = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut transport = StreamTransport::new(config_with_endpoint(&server.url()), context());
        transport.init().await.expect("init failed");
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_puts_in_bounded_sub_batches() {
        let mut server = mockito::Server::new_async().await;
        let _describe = mock_active_stream(&mut server).await;
        // 1 probe put at init, then 7 tenant batches drain as 5 + 2.
        let put = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(200)
            .expect(3)
            .create_async()
            .await;

        let mut transport = StreamTransport::new(config_with_endpoint(&server.url()), context());
        transport.init().await.expect("init failed");

        let records: Vec<LogRecord> = (0..7)
            .map(|_| {
                LogRecord::new(
                    LogEvent::message(LogLevel::Info, "hello").with_tenant(Uuid::new_v4()),
                )
            })
            .collect();
        transport.write_records(records, Some(Utc::now())).await;

        put.assert_async().await;
        assert_eq!(transport.failed_calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_put_aborts_cycle() {
        let mut server = mockito::Server::new_async().await;
        let _describe = mock_active_stream(&mut server).await;
        let put_ok = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut transport = StreamTransport::new(config_with_endpoint(&server.url()), context());
        transport.init().await.expect("init failed");
        put_ok.assert_async().await;

        // All further puts fail; one failure is recorded and the remaining
        // sub-batches are never attempted.
        let put_fail = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let records: Vec<LogRecord> = (0..7)
            .map(|_| {
                LogRecord::new(
                    LogEvent::message(LogLevel::Info, "hello").with_tenant(Uuid::new_v4()),
                )
            })
            .collect();
        transport.write_records(records, Some(Utc::now())).await;

        put_fail.assert_async().await;
        assert_eq!(transport.failed_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_mirror_file_receives_batches() {
        let mut server = mockito::Server::new_async().await;
        let _describe = mock_active_stream(&mut server).await;
        let _put = server
            .mock("POST", PUT_RECORDS_PATH)
            .with_status(200)
            .expect_at_least(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("mirror.log");
        let mut config = config_with_endpoint(&server.url());
        config.filename = path.to_string_lossy().to_string();

        let mut transport = StreamTransport::new(config, context());
        transport.init().await.expect("init failed");

        let record = LogRecord::new(LogEvent::message(LogLevel::Info, "mirrored"));
        transport.write_records(vec![record], Some(Utc::now())).await;
        transport.close_io().await;

        let contents = std::fs::read_to_string(&path).expect("read failed");
        assert!(contents.contains("mirrored"));
    }
}
