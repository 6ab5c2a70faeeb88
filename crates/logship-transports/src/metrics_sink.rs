// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Counters-only transport: converts counter events straight into metric
//! observations, with no queue and no background task.
//!
//! Event names follow the `category.subcategory.detail` convention; the
//! first two segments become metric labels. Duration-category counts are
//! milliseconds and are recorded as seconds on a histogram.

use crate::registry::{TransportConfig, TransportContext};
use async_trait::async_trait;
use logship::{
    EventCode, LogEvent, Transport, TransportError, TransportSettings, TransportStats,
};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

pub const TRANSPORT_TYPE_METRICS: &str = "metrics";

const METRICS_TRANSPORT_NAME: &str = "MetricsTransport";
const DURATION_CATEGORY: &str = "duration";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsTransportConfig {
    #[serde(rename = "type")]
    pub transport_type: String,
    #[serde(rename = "transportconfig", default)]
    pub settings: TransportSettings,
}

impl TransportConfig for MetricsTransportConfig {
    fn transport_type(&self) -> &'static str {
        TRANSPORT_TYPE_METRICS
    }

    fn is_singleton(&self) -> bool {
        true
    }

    fn validate(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn build(&self, _context: &TransportContext) -> Box<dyn Transport> {
        Box::new(MetricsTransport::new(self.clone()))
    }
}

pub struct MetricsTransport {
    config: MetricsTransportConfig,
    sent: AtomicI64,
}

impl MetricsTransport {
    pub fn new(config: MetricsTransportConfig) -> Self {
        MetricsTransport {
            config,
            sent: AtomicI64::new(0),
        }
    }

    /// `(category, subcategory)` from the event name; missing segments map
    /// to "none".
    fn split_name(name: &str) -> (String, String) {
        let mut parts = name.splitn(3, '.');
        let category = parts.next().unwrap_or("none");
        let subcategory = parts.next().unwrap_or("none");
        (category.to_string(), subcategory.to_string())
    }
}

#[async_trait]
impl Transport for MetricsTransport {
    async fn init(&mut self) -> Result<TransportSettings, TransportError> {
        Ok(self.config.settings)
    }

    fn write(&self, event: &LogEvent) {
        // Only counter events turn into observations.
        if event.code == EventCode::NONE || event.name.is_empty() {
            return;
        }
        let (category, subcategory) = Self::split_name(&event.name);
        let tenant = event
            .tenant_id
            .unwrap_or_else(Uuid::nil)
            .to_string();
        if category == DURATION_CATEGORY {
            // Duration counts arrive in milliseconds.
            histogram!(
                "logship_event_duration_seconds",
                "event" => event.name.clone(),
                "category" => category,
                "subcategory" => subcategory,
                "tenant" => tenant,
            )
            .record(event.count as f64 / 1000.0);
        } else {
            counter!(
                "logship_events_total",
                "event" => event.name.clone(),
                "category" => category,
                "subcategory" => subcategory,
                "tenant" => tenant,
            )
            .increment(event.count.max(0) as u64);
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    async fn flush(&self) -> Result<(), TransportError> {
        // Observations are emitted synchronously; nothing to drain.
        Ok(())
    }

    async fn close(&self) {}

    fn get_stats(&self) -> TransportStats {
        TransportStats {
            name: METRICS_TRANSPORT_NAME,
            queue_size: 0,
            dropped_event_count: 0,
            sent_event_count: self.sent.load(Ordering::Relaxed),
            failed_api_calls_count: 0,
        }
    }

    fn name(&self) -> &'static str {
        METRICS_TRANSPORT_NAME
    }

    fn required(&self) -> bool {
        self.config.settings.required
    }
}
