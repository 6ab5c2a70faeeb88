// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-writer buffered append to a local log file.
//!
//! Lines are ANSI-stripped before writing and optionally prefixed with the
//! enqueue timestamp and request ID. The buffer is flushed on every drain
//! (one per 100ms tick) and synced to disk on explicit flush.

use crate::registry::{TransportConfig, TransportContext};
use crate::record::LogRecord;
use crate::telemetry;
use crate::writer::{BackgroundWriter, IoTransport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship::{LogLevel, Transport, TransportError, TransportSettings};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::error;

pub const TRANSPORT_TYPE_FILE: &str = "file";

const FILE_TRANSPORT_NAME: &str = "FileTransport";
const FILE_IO_INTERVAL: Duration = Duration::from_millis(100);
const ANSI_PATTERN: &str = "\x1b\\[[0-9;]*[A-Za-z]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransportConfig {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(rename = "transportconfig", default)]
    pub settings: TransportSettings,
    pub filename: String,
    #[serde(default)]
    pub prepend_timestamp: bool,
    #[serde(default)]
    pub prepend_request_id: bool,
}

impl TransportConfig for FileTransportConfig {
    fn transport_type(&self) -> &'static str {
        TRANSPORT_TYPE_FILE
    }

    fn is_singleton(&self) -> bool {
        // Several file transports may write to different files.
        false
    }

    fn validate(&self) -> Result<(), TransportError> {
        if !self.settings.required {
            return Ok(());
        }
        if self.filename.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing filename".to_string(),
            ));
        }
        Ok(())
    }

    fn build(&self, _context: &TransportContext) -> Box<dyn Transport> {
        Box::new(BackgroundWriter::new(FileTransport::new(self.clone())))
    }
}

pub struct FileTransport {
    config: FileTransportConfig,
    writer: Option<BufWriter<File>>,
    ansi: Option<Regex>,
    failed_calls: Arc<AtomicI64>,
}

impl FileTransport {
    pub fn new(config: FileTransportConfig) -> Self {
        FileTransport {
            config,
            writer: None,
            ansi: None,
            failed_calls: Arc::new(AtomicI64::new(0)),
        }
    }

    fn format_line(&self, record: &LogRecord) -> String {
        let mut line = String::new();
        if self.config.prepend_timestamp {
            line.push_str(&record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f ").to_string());
        }
        if self.config.prepend_request_id {
            if let Some(request_id) = record.event.request_id {
                line.push_str(&format!("{}: ", request_id));
            }
        }
        match &self.ansi {
            Some(ansi) => line.push_str(&ansi.replace_all(&record.event.message, "")),
            None => line.push_str(&record.event.message),
        }
        line.push('\n');
        line
    }

    fn record_failure(&self, op: &'static str, err: &std::io::Error) {
        self.failed_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        telemetry::inc_failed(FILE_TRANSPORT_NAME, op);
        error!("File transport {} failed: {}", op, err);
    }
}

#[async_trait]
impl IoTransport for FileTransport {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        if self.config.filename.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing filename".to_string(),
            ));
        }
        self.ansi = Some(
            Regex::new(ANSI_PATTERN)
                .map_err(|err| TransportError::Init(format!("bad ANSI pattern: {}", err)))?,
        );
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.config.filename)
            .await?;
        self.writer = Some(BufWriter::new(file));
        Ok(TransportSettings {
            required: self.settings().required,
            max_log_level: self.settings().max_log_level,
        })
    }

    async fn write_records(&mut self, records: Vec<LogRecord>, _start_time: Option<DateTime<Utc>>) {
        let lines: Vec<String> = records.iter().map(|r| self.format_line(r)).collect();
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        for line in &lines {
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                self.record_failure("write", &err);
                return;
            }
        }
        // Flush every drain so the file never lags the queue by more than
        // one tick.
        if let Err(err) = writer.flush().await {
            self.record_failure("flush", &err);
        }
    }

    fn io_interval(&self) -> Duration {
        FILE_IO_INTERVAL
    }

    fn max_log_level(&self) -> LogLevel {
        self.settings().max_log_level
    }

    fn transport_name(&self) -> &'static str {
        FILE_TRANSPORT_NAME
    }

    fn required(&self) -> bool {
        self.config.settings.required
    }

    fn supports_counters(&self) -> bool {
        false
    }

    async fn flush_io(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush().await {
                self.record_failure("flush", &err);
                return;
            }
            if let Err(err) = writer.get_ref().sync_all().await {
                self.record_failure("sync", &err);
            }
        }
    }

    async fn close_io(&mut self) {
        self.flush_io().await;
        self.writer = None;
    }

    fn failed_calls(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.failed_calls)
    }
}

impl FileTransport {
    fn settings(&self) -> &TransportSettings {
        &self.config.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship::LogEvent;
    use uuid::Uuid;

    fn config_for(path: &std::path::Path) -> FileTransportConfig {
        FileTransportConfig {
            transport_type: TRANSPORT_TYPE_FILE.to_string(),
            settings: TransportSettings {
                required: false,
                max_log_level: LogLevel::Debug,
            },
            filename: path.to_string_lossy().to_string(),
            prepend_timestamp: false,
            prepend_request_id: false,
        }
    }

    #[tokio::test]
    async fn test_writes_lines_in_order() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("svc.log");
        let mut transport = FileTransport::new(config_for(&path));
        transport.init().await.expect("init failed");

        let records: Vec<LogRecord> = (0..10)
            .map(|i| LogRecord::new(LogEvent::message(LogLevel::Info, format!("line-{}", i))))
            .collect();
        transport.write_records(records, None).await;
        transport.flush_io().await;

        let contents = std::fs::read_to_string(&path).expect("read failed");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 10);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("line-{}", i));
        }
    }

    #[tokio::test]
    async fn test_strips_ansi_sequences() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("svc.log");
        let mut transport = FileTransport::new(config_for(&path));
        transport.init().await.expect("init failed");

        let record = LogRecord::new(LogEvent::message(
            LogLevel::Info,
            "\x1b[31mred alert\x1b[0m done",
        ));
        transport.write_records(vec![record], None).await;
        transport.close_io().await;

        let contents = std::fs::read_to_string(&path).expect("read failed");
        assert_eq!(contents, "red alert done\n");
    }

    #[tokio::test]
    async fn test_optional_prefixes() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("svc.log");
        let mut config = config_for(&path);
        config.prepend_request_id = true;
        let mut transport = FileTransport::new(config);
        transport.init().await.expect("init failed");

        let request_id = Uuid::new_v4();
        let record = LogRecord::new(
            LogEvent::message(LogLevel::Info, "handled").with_request_id(request_id),
        );
        transport.write_records(vec![record], None).await;
        transport.close_io().await;

        let contents = std::fs::read_to_string(&path).expect("read failed");
        assert_eq!(contents, format!("{}: handled\n", request_id));
    }

    #[tokio::test]
    async fn test_init_requires_filename() {
        let mut config = config_for(std::path::Path::new(""));
        config.filename = String::new();
        let mut transport = FileTransport::new(config);
        assert!(matches!(
            transport.init().await,
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
