// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Type-directed decoding of transport configuration.
//!
//! Each backend registers a decoder keyed by its `type` tag; decoding a
//! config list probes the registered decoders in turn and keeps the first
//! definitive match. The registry is an explicit object wired up at process
//! start, not a global populated by load-time side effects.

use logship::{Transport, TransportError};
use serde_json::Value;

/// Construction context handed to every backend: identity of the process
/// the transports ship events for.
#[derive(Debug, Clone, Default)]
pub struct TransportContext {
    pub service: String,
    pub host: String,
    pub region: String,
    /// Bearer token for transports that authenticate to a remote service.
    pub auth_token: Option<String>,
}

/// A decoded, typed transport configuration.
pub trait TransportConfig: Send + Sync {
    fn transport_type(&self) -> &'static str;

    /// Singleton types keep at most one instance across merged sources.
    fn is_singleton(&self) -> bool;

    /// Fail-fast validation, run before any event is accepted. Optional
    /// (non-required) transports skip most checks so partially configured
    /// environments still come up.
    fn validate(&self) -> Result<(), TransportError>;

    fn build(&self, context: &TransportContext) -> Box<dyn Transport>;
}

type DecoderFn = Box<dyn Fn(&Value) -> Option<Box<dyn TransportConfig>> + Send + Sync>;

struct Decoder {
    type_tag: &'static str,
    decode: DecoderFn,
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Decoder>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        DecoderRegistry::default()
    }

    /// Registers a decoder for one `type` tag. The decoder itself checks the
    /// tag and returns `None` on a mismatch, so probing is cheap.
    pub fn register(
        &mut self,
        type_tag: &'static str,
        decode: impl Fn(&Value) -> Option<Box<dyn TransportConfig>> + Send + Sync + 'static,
    ) {
        self.decoders.push(Decoder {
            type_tag,
            decode: Box::new(decode),
        });
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.type_tag).collect()
    }

    /// Probes every registered decoder and keeps the first match.
    pub fn decode_entry(&self, value: &Value) -> Result<Box<dyn TransportConfig>, TransportError> {
        for decoder in &self.decoders {
            if let Some(config) = (decoder.decode)(value) {
                return Ok(config);
            }
        }
        Err(TransportError::InvalidConfig(format!(
            "unknown transport type in config entry: {}",
            value.get("type").unwrap_or(&Value::Null)
        )))
    }

    /// Decodes one configuration source: a YAML or JSON list of tagged
    /// transport entries.
    pub fn decode_source(&self, text: &str) -> Result<Vec<Box<dyn TransportConfig>>, TransportError> {
        let entries: Vec<Value> = serde_yaml::from_str(text)
            .map_err(|err| TransportError::InvalidConfig(format!("bad transport config: {}", err)))?;
        entries.iter().map(|entry| self.decode_entry(entry)).collect()
    }

    /// Decodes and merges several configuration sources. Singleton types are
    /// overridden in place by later sources; non-singleton types accumulate.
    pub fn load(&self, sources: &[&str]) -> Result<Vec<Box<dyn TransportConfig>>, TransportError> {
        let mut merged: Vec<Box<dyn TransportConfig>> = Vec::new();
        for source in sources {
            let configs = self.decode_source(source)?;
            merge_configs(&mut merged, configs);
        }
        for config in &merged {
            config.validate()?;
        }
        Ok(merged)
    }
}

fn merge_configs(
    merged: &mut Vec<Box<dyn TransportConfig>>,
    incoming: Vec<Box<dyn TransportConfig>>,
) {
    for config in incoming {
        if config.is_singleton() {
            if let Some(existing) = merged
                .iter_mut()
                .find(|c| c.transport_type() == config.transport_type())
            {
                *existing = config;
                continue;
            }
        }
        merged.push(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::register_builtin_decoders;

    fn builtin_registry() -> DecoderRegistry {
        let mut registry = DecoderRegistry::new();
        register_builtin_decoders(&mut registry);
        registry
    }

    #[test]
    fn test_decode_yaml_entry_by_type() {
        let registry = builtin_registry();
        let configs = registry
            .decode_source(
                r#"
- type: file
  transportconfig:
    required: true
    max_log_level: 4
  filename: /tmp/svc.log
"#,
            )
            .expect("decode failed");
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].transport_type(), "file");
        assert!(!configs[0].is_singleton());
    }

    #[test]
    fn test_decode_json_source() {
        // JSON is valid YAML; the same probe path handles both.
        let registry = builtin_registry();
        let configs = registry
            .decode_source(
                r#"[{"type":"jsonlines","transportconfig":{"required":false,"max_log_level":3}}]"#,
            )
            .expect("decode failed");
        assert_eq!(configs[0].transport_type(), "jsonlines");
        assert!(configs[0].is_singleton());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let registry = builtin_registry();
        let result = registry.decode_source("- type: carrier-pigeon\n");
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    #[test]
    fn test_singleton_merge_last_source_wins() {
        let registry = builtin_registry();
        let first = r#"
- type: jsonlines
  transportconfig:
    required: false
    max_log_level: 3
- type: file
  transportconfig:
    required: false
    max_log_level: 3
  filename: /tmp/a.log
"#;
        let second = r#"
- type: jsonlines
  transportconfig:
    required: false
    max_log_level: 5
- type: file
  transportconfig:
    required: false
    max_log_level: 3
  filename: /tmp/b.log
"#;
        let merged = registry.load(&[first, second]).expect("load failed");

        // One jsonlines instance survives; file entries accumulate.
        let jsonlines: Vec<_> = merged
            .iter()
            .filter(|c| c.transport_type() == "jsonlines")
            .collect();
        assert_eq!(jsonlines.len(), 1);
        let files: Vec<_> = merged
            .iter()
            .filter(|c| c.transport_type() == "file")
            .collect();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_load_validates_required_configs() {
        let registry = builtin_registry();
        // Required file transport with no filename must fail fast.
        let result = registry.load(&[r#"
- type: file
  transportconfig:
    required: true
    max_log_level: 4
  filename: ""
"#]);
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
