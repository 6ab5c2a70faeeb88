// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups drained records into per-tenant transfer batches.
//!
//! A batch is the unit handed to a backend in one network call and contains
//! records for exactly one tenant. Field names match what the read-side
//! tooling parses, so they stay in their historical exported-Go casing.

use crate::record::LogRecord;
use chrono::{DateTime, Utc};
use logship::EventCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Records per batch before the accumulator is sealed. The seal check runs
/// only after an append pushes the accumulator *past* the cap, so full
/// batches actually carry `MAX_RECORDS_PER_BATCH + 1` records; existing
/// stream consumers depend on that boundary.
pub const MAX_RECORDS_PER_BATCH: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordContent {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Code")]
    pub code: EventCode,
    #[serde(rename = "Count")]
    pub count: i64,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Payload")]
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordBatch {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "TenantID")]
    pub tenant_id: Uuid,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Records")]
    pub records: Vec<RecordContent>,
}

/// Walks the chronological record list once, grouping records by tenant and
/// sealing a tenant's accumulator whenever it grows past the cap. Batches
/// for different tenants are not ordered relative to each other; within a
/// tenant, record order is insertion order.
pub fn encode_for_transfer(
    records: &[LogRecord],
    region: &str,
    host: &str,
    service: &str,
) -> Vec<RecordBatch> {
    let mut sealed: Vec<RecordBatch> = Vec::new();
    let mut open: HashMap<Uuid, Vec<RecordContent>> = HashMap::new();

    for record in records {
        let tenant_id = record.event.tenant_id.unwrap_or_else(Uuid::nil);
        let message = match record.event.request_id {
            Some(request_id) => format!("{}: {}", request_id, record.event.message),
            None => record.event.message.clone(),
        };

        let accumulator = open.entry(tenant_id).or_default();
        accumulator.push(RecordContent {
            timestamp: record.timestamp,
            code: record.event.code,
            count: record.event.count,
            message,
            payload: record.event.payload.clone(),
        });

        if accumulator.len() > MAX_RECORDS_PER_BATCH {
            sealed.push(RecordBatch {
                service: service.to_string(),
                tenant_id,
                region: region.to_string(),
                host: host.to_string(),
                records: std::mem::take(accumulator),
            });
        }
    }

    for (tenant_id, accumulator) in open {
        if !accumulator.is_empty() {
            sealed.push(RecordBatch {
                service: service.to_string(),
                tenant_id,
                region: region.to_string(),
                host: host.to_string(),
                records: accumulator,
            });
        }
    }

    sealed
}
