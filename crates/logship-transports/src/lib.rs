// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pluggable delivery backends for the event pipeline.
//!
//! Most backends run behind [`writer::BackgroundWriter`], which owns the
//! bounded in-memory queue, the admission-level backpressure and the
//! background drain task; the backend itself only implements the actual I/O.
//! The [`config`] module wires all built-in backends into a decoder registry
//! and turns configuration sources into a ready [`logship::Logger`].

pub mod backoff;
pub mod collector;
pub mod collector_client;
pub mod config;
pub mod encode;
pub mod file;
pub mod jsonlines;
pub mod metrics_sink;
pub mod record;
pub mod registry;
pub mod stream;
pub mod stream_client;
mod telemetry;
pub mod writer;

pub use backoff::BackoffThresholds;
pub use collector::{CollectorTransport, CollectorTransportConfig, TRANSPORT_TYPE_COLLECTOR};
pub use collector_client::{CollectorClient, CollectorSettings};
pub use config::{build_transports, init_logger, register_builtin_decoders};
pub use encode::{encode_for_transfer, RecordBatch, RecordContent, MAX_RECORDS_PER_BATCH};
pub use file::{FileTransport, FileTransportConfig, TRANSPORT_TYPE_FILE};
pub use jsonlines::{JsonLinesTransport, JsonLinesTransportConfig, TRANSPORT_TYPE_JSONLINES};
pub use metrics_sink::{MetricsTransport, MetricsTransportConfig, TRANSPORT_TYPE_METRICS};
pub use record::LogRecord;
pub use registry::{DecoderRegistry, TransportConfig, TransportContext};
pub use stream::{StreamTransport, StreamTransportConfig, TRANSPORT_TYPE_STREAM};
pub use stream_client::{PutRecordsEntry, StreamClient, StreamDescription};
pub use writer::{BackgroundWriter, IoTransport};
