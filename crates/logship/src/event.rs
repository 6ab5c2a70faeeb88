// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit of work flowing through the pipeline.
//!
//! A [`LogEvent`] is produced by caller code and never mutated by the
//! pipeline once created. Events carry either message text, a counter code,
//! or both; counter-only events use [`LogLevel::NonMessage`].

use crate::error::TransportError;
use crate::level::LogLevel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable numeric identifier for a counter event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct EventCode(pub i32);

impl EventCode {
    /// Event carries no counter, message only.
    pub const NONE: EventCode = EventCode(0);
    /// Event name was not recognized by the server-side metadata map.
    pub const UNKNOWN: EventCode = EventCode(1);
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogEvent {
    pub log_level: LogLevel,
    pub name: String,
    pub code: EventCode,
    pub count: i64,
    pub message: String,
    pub payload: String,
    pub user_agent: String,
    pub request_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
}

impl LogEvent {
    /// A plain message event at the given level.
    pub fn message(log_level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            log_level,
            message: message.into(),
            count: 1,
            ..Default::default()
        }
    }

    /// A counter-only event: no message text, `NonMessage` level.
    pub fn counter(name: impl Into<String>, code: EventCode, count: i64) -> Self {
        LogEvent {
            log_level: LogLevel::NonMessage,
            name: name.into(),
            code,
            count,
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// An event must carry either message text or a counter identity.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.message.is_empty() && self.name.is_empty() && self.code == EventCode::NONE {
            return Err(TransportError::InvalidEvent(
                "event has neither a message nor a counter name/code".to_string(),
            ));
        }
        if self.log_level == LogLevel::None {
            return Err(TransportError::InvalidEvent(
                "events may not be logged at level none".to_string(),
            ));
        }
        Ok(())
    }
}

/// Post-initialization transport state consulted by the fan-out logger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TransportSettings {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_log_level: LogLevel,
}

/// Per-transport delivery counters, observable via `GetStats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStats {
    pub name: &'static str,
    pub queue_size: i64,
    pub dropped_event_count: i64,
    pub sent_event_count: i64,
    pub failed_api_calls_count: i64,
}
