// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-out facade over a set of configured transports.
//!
//! Service code holds one [`Logger`] per process and calls [`Logger::write`]
//! for every structured event. Each transport receives the event if it is a
//! counter event or if the transport's max log level admits it.

use crate::error::TransportError;
use crate::event::{EventCode, LogEvent, TransportSettings, TransportStats};
use crate::transport::Transport;
use tracing::{error, warn};

pub struct Logger {
    service: String,
    transports: Vec<Box<dyn Transport>>,
    settings: Vec<TransportSettings>,
}

impl Logger {
    /// Initializes every transport and keeps the ones that succeed. A failed
    /// transport marked `required` aborts startup; optional transports that
    /// fail are logged and skipped.
    pub async fn init(
        service: impl Into<String>,
        transports: Vec<Box<dyn Transport>>,
    ) -> Result<Self, TransportError> {
        let mut logger = Logger {
            service: service.into(),
            transports: Vec::with_capacity(transports.len()),
            settings: Vec::with_capacity(transports.len()),
        };
        for mut transport in transports {
            let name = transport.name();
            match transport.init().await {
                Ok(settings) => {
                    logger.transports.push(transport);
                    logger.settings.push(settings);
                }
                // Any init failure aborts startup when the transport is
                // configured as required, whatever the error was.
                Err(err) if transport.required() => {
                    return Err(TransportError::RequiredTransportFailed(format!(
                        "{}: {}",
                        name, err
                    )));
                }
                Err(err) => {
                    warn!("Skipping transport {} that failed to initialize: {}", name, err);
                }
            }
        }
        Ok(logger)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Routes one event to every transport that accepts it. Invalid events
    /// are dropped with a warning rather than surfaced to the caller.
    pub fn write(&self, event: &LogEvent) {
        if let Err(err) = event.validate() {
            warn!("Dropping invalid log event: {}", err);
            return;
        }

        // Tab-indent continuation lines so multiline messages stay readable
        // in line-oriented sinks.
        let indented;
        let event = if event.message.contains('\n') {
            indented = LogEvent {
                message: event.message.replace('\n', "\n\t"),
                ..event.clone()
            };
            &indented
        } else {
            event
        };

        for (transport, settings) in self.transports.iter().zip(self.settings.iter()) {
            if event.code != EventCode::NONE || event.log_level <= settings.max_log_level {
                transport.write(event);
            }
        }
    }

    /// Forces a drain on every transport.
    pub async fn flush(&self) {
        for transport in &self.transports {
            if let Err(err) = transport.flush().await {
                error!("Failed to flush transport {}: {}", transport.name(), err);
            }
        }
    }

    pub fn get_stats(&self) -> Vec<TransportStats> {
        self.transports.iter().map(|t| t.get_stats()).collect()
    }

    /// Drains and shuts down every transport. Queued-but-undelivered events
    /// are attempted before this returns.
    pub async fn close(&self) {
        for transport in &self.transports {
            transport.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    struct RecordingTransport {
        written: Arc<AtomicI64>,
        closed: Arc<AtomicI64>,
        max_log_level: LogLevel,
        fail_init: bool,
        required: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn init(&mut self) -> Result<TransportSettings, TransportError> {
            if self.fail_init {
                return Err(TransportError::Request("connection refused".to_string()));
            }
            Ok(TransportSettings {
                required: self.required,
                max_log_level: self.max_log_level,
            })
        }

        fn write(&self, _event: &LogEvent) {
            self.written.fetch_add(1, Ordering::Relaxed);
        }

        async fn flush(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }

        fn get_stats(&self) -> TransportStats {
            TransportStats {
                name: self.name(),
                queue_size: 0,
                dropped_event_count: 0,
                sent_event_count: self.written.load(Ordering::Relaxed),
                failed_api_calls_count: 0,
            }
        }

        fn name(&self) -> &'static str {
            "RecordingTransport"
        }

        fn required(&self) -> bool {
            self.required
        }
    }

    fn recording(max_log_level: LogLevel) -> (Box<dyn Transport>, Arc<AtomicI64>, Arc<AtomicI64>) {
        let written = Arc::new(AtomicI64::new(0));
        let closed = Arc::new(AtomicI64::new(0));
        let transport = Box::new(RecordingTransport {
            written: Arc::clone(&written),
            closed: Arc::clone(&closed),
            max_log_level,
            fail_init: false,
            required: false,
        });
        (transport, written, closed)
    }

    #[tokio::test]
    async fn test_fan_out_respects_max_level() {
        let (verbose_t, verbose_written, _) = recording(LogLevel::Verbose);
        let (error_t, error_written, _) = recording(LogLevel::Error);
        let logger = Logger::init("idp", vec![verbose_t, error_t])
            .await
            .expect("init failed");

        logger.write(&LogEvent::message(LogLevel::Debug, "only verbose sees this"));
        assert_eq!(verbose_written.load(Ordering::Relaxed), 1);
        assert_eq!(error_written.load(Ordering::Relaxed), 0);

        // Counter events bypass the level check.
        logger.write(&LogEvent::counter("authn.login", EventCode(7), 1));
        assert_eq!(verbose_written.load(Ordering::Relaxed), 2);
        assert_eq!(error_written.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_optional_init_failure_is_skipped() {
        let failing = Box::new(RecordingTransport {
            written: Arc::new(AtomicI64::new(0)),
            closed: Arc::new(AtomicI64::new(0)),
            max_log_level: LogLevel::Info,
            fail_init: true,
            required: false,
        });
        let (ok_t, _, _) = recording(LogLevel::Info);
        let logger = Logger::init("idp", vec![failing, ok_t])
            .await
            .expect("init failed");
        assert_eq!(logger.transport_count(), 1);
    }

    #[tokio::test]
    async fn test_required_init_failure_aborts() {
        // A network-style failure, not a config error: the required flag
        // alone decides that startup aborts.
        let failing = Box::new(RecordingTransport {
            written: Arc::new(AtomicI64::new(0)),
            closed: Arc::new(AtomicI64::new(0)),
            max_log_level: LogLevel::Info,
            fail_init: true,
            required: true,
        });
        let result = Logger::init("idp", vec![failing]).await;
        assert!(matches!(
            result,
            Err(TransportError::RequiredTransportFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_reaches_every_transport() {
        let (a, _, a_closed) = recording(LogLevel::Info);
        let (b, _, b_closed) = recording(LogLevel::Info);
        let logger = Logger::init("idp", vec![a, b]).await.expect("init failed");
        logger.close().await;
        assert_eq!(a_closed.load(Ordering::Relaxed), 1);
        assert_eq!(b_closed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_invalid_event_dropped() {
        let (t, written, _) = recording(LogLevel::Verbose);
        let logger = Logger::init("idp", vec![t]).await.expect("init failed");
        logger.write(&LogEvent::default());
        assert_eq!(written.load(Ordering::Relaxed), 0);
    }
}
