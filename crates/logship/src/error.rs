// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can occur while configuring or driving a transport.
///
/// Only configuration and initialization errors ever reach callers; delivery
/// failures are counted and logged inside the background task instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("transport initialization failed: {0}")]
    Init(String),

    #[error("required transport failed to initialize: {0}")]
    RequiredTransportFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),
}
