// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue-depth admission control.
//!
//! As the queue grows past each threshold the minimum admitted severity
//! rises, shedding low-value events first; past the max threshold nothing is
//! admitted. Counter-only events are shed earlier than messages, once the
//! admission level has fallen to `Warning` or below.
//!
//! The default thresholds assume a writer draining every 100ms. The file and
//! stdout backends keep up with over a million lines a second at that
//! cadence, so in practice these limits only engage when a backend stalls;
//! they exist to bound memory, not to pace healthy traffic.

use logship::LogLevel;

#[derive(Debug, Clone, Copy)]
pub struct BackoffThresholds {
    pub debug: i64,
    pub info: i64,
    pub warning: i64,
    pub error: i64,
    pub max: i64,
}

impl Default for BackoffThresholds {
    fn default() -> Self {
        BackoffThresholds {
            debug: 2_000_000,
            info: 3_500_000,
            warning: 5_000_000,
            error: 5_500_000,
            max: 6_000_000,
        }
    }
}

impl BackoffThresholds {
    /// Maximum severity admitted at the given queue depth. `LogLevel::None`
    /// means drop everything.
    pub fn admission_level(&self, depth: i64) -> LogLevel {
        if depth < self.debug {
            return LogLevel::Verbose;
        }
        if depth < self.info {
            return LogLevel::Debug;
        }
        if depth < self.warning {
            return LogLevel::Info;
        }
        if depth < self.error {
            return LogLevel::Warning;
        }
        if depth < self.max {
            return LogLevel::Error;
        }
        LogLevel::None
    }
}
