// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the remote log collector.
//!
//! Two endpoints: one accepting aggregated counters for a time period, one
//! accepting raw JSON-encoded transfer batches. Both respond with a
//! [`CollectorSettings`] control message the server uses to throttle noisy
//! clients at runtime.

use chrono::{DateTime, Utc};
use logship::{LogLevel, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub const COUNTERS_PATH: &str = "/collector/counters";
pub const RAW_LOGS_PATH: &str = "/collector/rawlogs";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-pushed override of a running transport's sampling behavior.
/// Applied only when `update` is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct CollectorSettings {
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub send_raw_data: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub message_interval: i64,
    #[serde(default)]
    pub counters_interval: i64,
}

/// Counters aggregated per tenant, keyed by `(code, bucket[, ...])` strings.
pub type CounterMap = HashMap<Uuid, HashMap<String, i64>>;

/// JSON-encoded transfer batches buffered per tenant.
pub type MessageMap = HashMap<Uuid, Vec<String>>;

pub struct CollectorClient {
    http: reqwest::Client,
    base_url: String,
    tenant_id: Uuid,
    auth_token: Option<String>,
}

impl CollectorClient {
    pub fn new(
        base_url: impl Into<String>,
        tenant_id: Uuid,
        auth_token: Option<String>,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(TransportError::InvalidConfig(
                "logging config invalid - missing collector url".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Init(format!("failed to build http client: {}", err)))?;
        Ok(CollectorClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant_id,
            auth_token,
        })
    }

    /// Posts one time period's aggregated counters.
    pub async fn post_counters(
        &self,
        service: &str,
        instance_id: Uuid,
        base_time: DateTime<Utc>,
        counters: &CounterMap,
    ) -> Result<CollectorSettings, TransportError> {
        let url = format!("{}{}", self.base_url, COUNTERS_PATH);
        let query = [
            ("instance_id", instance_id.to_string()),
            ("base_time", base_time.to_rfc3339()),
            ("service", service.to_string()),
        ];
        self.post(&url, &query, counters).await
    }

    /// Posts buffered raw transfer batches.
    pub async fn post_raw_logs(
        &self,
        service: &str,
        instance_id: Uuid,
        messages: &MessageMap,
    ) -> Result<CollectorSettings, TransportError> {
        let url = format!("{}{}", self.base_url, RAW_LOGS_PATH);
        let query = [
            ("tenant_id", self.tenant_id.to_string()),
            ("instance_id", instance_id.to_string()),
            ("service", service.to_string()),
        ];
        self.post(&url, &query, messages).await
    }

    async fn post<B: Serialize>(
        &self,
        url: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<CollectorSettings, TransportError> {
        let mut request = self.http.post(url).query(query).json(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "collector returned {}",
                response.status()
            )));
        }
        response
            .json::<CollectorSettings>()
            .await
            .map_err(|err| TransportError::Request(format!("bad collector response: {}", err)))
    }
}
