// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline self-observation counters and gauges, labelled per transport.

use metrics::{counter, gauge};

pub(crate) fn set_queue_size(transport: &'static str, depth: i64) {
    gauge!("logship_queue_size", "transport" => transport).set(depth as f64);
}

pub(crate) fn inc_dropped(transport: &'static str) {
    counter!("logship_dropped_events_total", "transport" => transport).increment(1);
}

pub(crate) fn add_sent(transport: &'static str, count: u64) {
    counter!("logship_sent_events_total", "transport" => transport).increment(count);
}

pub(crate) fn inc_failed(transport: &'static str, op: &'static str) {
    counter!("logship_failed_calls_total", "transport" => transport, "op" => op).increment(1);
}

pub(crate) fn inc_successful(transport: &'static str) {
    counter!("logship_successful_calls_total", "transport" => transport).increment(1);
}
