// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::TransportError;
use crate::event::{LogEvent, TransportSettings, TransportStats};
use async_trait::async_trait;

/// Producer-facing contract for a delivery backend.
///
/// `write` must never block on network or disk I/O; delivery happens on a
/// background task owned by the transport. `flush` blocks until a drain
/// cycle completes, so it should only be called off the hot request path.
/// `close` performs one final drain and waits for the background task to
/// exit; it is safe to call more than once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Prepares backend resources and starts any background work. Called
    /// exactly once before the first `write`.
    async fn init(&mut self) -> Result<TransportSettings, TransportError>;

    /// Enqueues one event, subject to the transport's admission policy.
    /// Non-blocking; drops are counted, never surfaced.
    fn write(&self, event: &LogEvent);

    /// Requests a drain-now cycle and waits for it to complete. A no-op if
    /// the background task is not running.
    async fn flush(&self) -> Result<(), TransportError>;

    /// Performs a final drain, releases backend resources and waits for the
    /// background task to confirm completion.
    async fn close(&self);

    fn get_stats(&self) -> TransportStats;

    fn name(&self) -> &'static str;

    /// Whether a failed `init` must abort process startup instead of being
    /// skipped. Reflects the configured `required` flag, so it is meaningful
    /// even when `init` itself fails.
    fn required(&self) -> bool;
}
