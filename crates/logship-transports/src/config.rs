// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the built-in backends into a decoder registry, and the
//! top-level helper turning configuration sources into a ready [`Logger`].

use crate::collector::{CollectorTransportConfig, TRANSPORT_TYPE_COLLECTOR};
use crate::file::{FileTransportConfig, TRANSPORT_TYPE_FILE};
use crate::jsonlines::{JsonLinesTransportConfig, TRANSPORT_TYPE_JSONLINES};
use crate::metrics_sink::{MetricsTransportConfig, TRANSPORT_TYPE_METRICS};
use crate::registry::{DecoderRegistry, TransportConfig, TransportContext};
use crate::stream::{StreamTransportConfig, TRANSPORT_TYPE_STREAM};
use logship::{Logger, Transport, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Builds a tag-checking decoder for one config type: `None` on a tag
/// mismatch, a decode error only when the tag matched but the body didn't.
fn decoder_for<C>(type_tag: &'static str) -> impl Fn(&Value) -> Option<Box<dyn TransportConfig>>
where
    C: TransportConfig + DeserializeOwned + 'static,
{
    move |value: &Value| {
        if value.get("type")?.as_str()? != type_tag {
            return None;
        }
        serde_json::from_value::<C>(value.clone())
            .ok()
            .map(|config| Box::new(config) as Box<dyn TransportConfig>)
    }
}

/// Registers every built-in backend type.
pub fn register_builtin_decoders(registry: &mut DecoderRegistry) {
    registry.register(
        TRANSPORT_TYPE_FILE,
        decoder_for::<FileTransportConfig>(TRANSPORT_TYPE_FILE),
    );
    registry.register(
        TRANSPORT_TYPE_JSONLINES,
        decoder_for::<JsonLinesTransportConfig>(TRANSPORT_TYPE_JSONLINES),
    );
    registry.register(
        TRANSPORT_TYPE_METRICS,
        decoder_for::<MetricsTransportConfig>(TRANSPORT_TYPE_METRICS),
    );
    registry.register(
        TRANSPORT_TYPE_COLLECTOR,
        decoder_for::<CollectorTransportConfig>(TRANSPORT_TYPE_COLLECTOR),
    );
    registry.register(
        TRANSPORT_TYPE_STREAM,
        decoder_for::<StreamTransportConfig>(TRANSPORT_TYPE_STREAM),
    );
}

/// Decodes, merges and validates the given sources, then builds one
/// transport per surviving config entry.
pub fn build_transports(
    sources: &[&str],
    context: &TransportContext,
) -> Result<Vec<Box<dyn Transport>>, TransportError> {
    let mut registry = DecoderRegistry::new();
    register_builtin_decoders(&mut registry);
    let configs = registry.load(sources)?;
    Ok(configs
        .iter()
        .map(|config| config.build(context))
        .collect())
}

/// One-call setup: decode the sources, build the transports and initialize
/// a [`Logger`] over them.
pub async fn init_logger(
    sources: &[&str],
    context: &TransportContext,
) -> Result<Logger, TransportError> {
    let transports = build_transports(sources, context)?;
    Logger::init(context.service.clone(), transports).await
}
