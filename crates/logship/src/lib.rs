// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Core data model and producer-facing contract for the asynchronous
//! event/log transport pipeline.
//!
//! Service code creates [`LogEvent`]s and hands them to a [`Logger`], which
//! fans them out to the configured delivery transports. Transports buffer
//! events on a background task and never block the calling thread; see the
//! `logship-transports` crate for the concrete backends.

pub mod error;
pub mod event;
pub mod level;
pub mod logger;
pub mod transport;

pub use error::TransportError;
pub use event::{EventCode, LogEvent, TransportSettings, TransportStats};
pub use level::LogLevel;
pub use logger::Logger;
pub use transport::Transport;
