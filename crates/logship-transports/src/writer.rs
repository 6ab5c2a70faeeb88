// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background I/O wrapper: decouples event production from delivery for any
//! backend implementing [`IoTransport`].
//!
//! `init` spawns one task per wrapped backend running a select loop over a
//! periodic tick, an explicit flush request and a shutdown request. Producers
//! only ever touch the record queue; every drain, flush and close happens on
//! the background task, so a slow backend can never block request handling.

use crate::backoff::BackoffThresholds;
use crate::record::{LogRecord, RecordQueue};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logship::{
    LogEvent, LogLevel, Transport, TransportError, TransportSettings, TransportStats,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Contract for a backend whose I/O runs on the background task.
///
/// `write_records` is invoked on every tick, including ticks that drained
/// nothing; backends that aggregate across ticks (the collector) advance
/// their send intervals inside it.
#[async_trait]
pub trait IoTransport: Send + Sync + 'static {
    async fn init(&mut self) -> Result<TransportSettings, TransportError>;

    /// Delivers one drained batch. `start_time` is the earliest enqueue
    /// timestamp in the batch, absent when the drain was empty. Errors are
    /// counted and logged by the implementation, never returned.
    async fn write_records(&mut self, records: Vec<LogRecord>, start_time: Option<DateTime<Utc>>);

    fn io_interval(&self) -> Duration;

    fn max_log_level(&self) -> LogLevel;

    fn transport_name(&self) -> &'static str;

    /// Whether this backend is configured as required, readable before
    /// `init` so a failed init can abort startup.
    fn required(&self) -> bool;

    /// Whether this backend batches counter events as well as messages.
    /// Counter-supporting backends receive every admitted event; others only
    /// non-empty messages at or below their max level.
    fn supports_counters(&self) -> bool;

    /// Pushes buffered data to durable/remote storage on explicit flush.
    async fn flush_io(&mut self);

    /// Final flush plus resource release, invoked once at shutdown.
    async fn close_io(&mut self);

    /// Shared failed-call counter, read by `GetStats` while the backend is
    /// owned by the background task.
    fn failed_calls(&self) -> Arc<AtomicI64>;
}

enum WriterCommand {
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct BackgroundWriter<T: IoTransport> {
    wrapped: Option<T>,
    name: &'static str,
    thresholds: BackoffThresholds,
    required: bool,
    supports_counters: bool,
    max_log_level: LogLevel,
    queue: Arc<RecordQueue>,
    dropped: AtomicI64,
    sent: Arc<AtomicI64>,
    failed: Arc<AtomicI64>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<WriterCommand>>>,
}

impl<T: IoTransport> BackgroundWriter<T> {
    pub fn new(wrapped: T) -> Self {
        Self::with_thresholds(wrapped, BackoffThresholds::default())
    }

    pub fn with_thresholds(wrapped: T, thresholds: BackoffThresholds) -> Self {
        let name = wrapped.transport_name();
        let required = wrapped.required();
        let supports_counters = wrapped.supports_counters();
        let max_log_level = wrapped.max_log_level();
        let failed = wrapped.failed_calls();
        BackgroundWriter {
            wrapped: Some(wrapped),
            name,
            thresholds,
            required,
            supports_counters,
            max_log_level,
            queue: Arc::new(RecordQueue::new()),
            dropped: AtomicI64::new(0),
            sent: Arc::new(AtomicI64::new(0)),
            failed,
            cmd_tx: Mutex::new(None),
        }
    }

    fn enqueue(&self, event: &LogEvent) {
        // Admission check protects the process from unbounded queue growth
        // when the writer falls behind.
        let admitted = self.thresholds.admission_level(self.queue.depth());
        if admitted < event.log_level
            || (admitted <= LogLevel::Warning && event.log_level == LogLevel::NonMessage)
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            telemetry::inc_dropped(self.name);
            return;
        }

        let depth = self.queue.push(LogRecord::new(event.clone()));
        telemetry::set_queue_size(self.name, depth);
    }

    fn command_sender(&self) -> Option<mpsc::UnboundedSender<WriterCommand>> {
        #[allow(clippy::expect_used)]
        self.cmd_tx.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl<T: IoTransport> Transport for BackgroundWriter<T> {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        let mut wrapped = self
            .wrapped
            .take()
            .ok_or_else(|| TransportError::Init("transport already initialized".to_string()))?;
        let settings = wrapped.init().await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let queue = Arc::clone(&self.queue);
        let sent = Arc::clone(&self.sent);
        let name = self.name;
        tokio::spawn(run_io_loop(wrapped, queue, sent, cmd_rx, name));

        #[allow(clippy::expect_used)]
        let mut guard = self.cmd_tx.lock().expect("lock poisoned");
        *guard = Some(cmd_tx);

        Ok(settings)
    }

    fn write(&self, event: &LogEvent) {
        if self.supports_counters {
            self.enqueue(event);
        } else if !event.message.is_empty() && event.log_level <= self.max_log_level {
            self.enqueue(event);
        }
    }

    async fn flush(&self) -> Result<(), TransportError> {
        let Some(cmd_tx) = self.command_sender() else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if cmd_tx.send(WriterCommand::Flush(ack_tx)).is_err() {
            // Background task already exited; nothing left to flush.
            return Ok(());
        }
        let _ = ack_rx.await;
        Ok(())
    }

    async fn close(&self) {
        let Some(cmd_tx) = self.command_sender() else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if cmd_tx.send(WriterCommand::Shutdown(ack_tx)).is_err() {
            // Already shut down; close is idempotent.
            return;
        }
        let _ = ack_rx.await;
    }

    fn get_stats(&self) -> TransportStats {
        TransportStats {
            name: self.name,
            queue_size: self.queue.depth(),
            dropped_event_count: self.dropped.load(Ordering::Relaxed),
            sent_event_count: self.sent.load(Ordering::Relaxed),
            failed_api_calls_count: self.failed.load(Ordering::Relaxed),
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn required(&self) -> bool {
        self.required
    }
}

async fn run_io_loop<T: IoTransport>(
    mut wrapped: T,
    queue: Arc<RecordQueue>,
    sent: Arc<AtomicI64>,
    mut cmd_rx: mpsc::UnboundedReceiver<WriterCommand>,
    name: &'static str,
) {
    debug!("Background writer for {} started", name);
    let mut ticker = tokio::time::interval(wrapped.io_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                drain_to_io(&mut wrapped, &queue, &sent, name).await;
            }
            command = cmd_rx.recv() => match command {
                Some(WriterCommand::Flush(ack)) => {
                    drain_to_io(&mut wrapped, &queue, &sent, name).await;
                    wrapped.flush_io().await;
                    let _ = ack.send(());
                }
                Some(WriterCommand::Shutdown(ack)) => {
                    drain_to_io(&mut wrapped, &queue, &sent, name).await;
                    wrapped.close_io().await;
                    debug!("Background writer for {} stopped", name);
                    let _ = ack.send(());
                    return;
                }
                None => {
                    // All handles dropped without an explicit close; still
                    // perform the final drain before exiting.
                    drain_to_io(&mut wrapped, &queue, &sent, name).await;
                    wrapped.close_io().await;
                    debug!("Background writer for {} stopped", name);
                    return;
                }
            }
        }
    }
}

async fn drain_to_io<T: IoTransport>(
    wrapped: &mut T,
    queue: &RecordQueue,
    sent: &AtomicI64,
    name: &'static str,
) {
    let drained = queue.drain();
    let count = drained.len();
    telemetry::set_queue_size(name, queue.depth());
    if count > 0 {
        sent.fetch_add(count as i64, Ordering::Relaxed);
        telemetry::add_sent(name, count as u64);
    }
    let start_time = drained.front().map(|record| record.timestamp);
    wrapped.write_records(Vec::from(drained), start_time).await;
}
