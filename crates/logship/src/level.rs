// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log severity levels and their admission ordering.
//!
//! Levels are totally ordered: `NonMessage < None < Error < Warning < Info <
//! Debug < Verbose`. `NonMessage` marks counter-only events that carry no
//! message text; `None` is the floor returned by the backpressure controller
//! when the queue is full and nothing may be admitted. Levels are encoded as
//! signed integers in configuration and on the wire.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    /// Counter-only event, no message text.
    NonMessage,
    /// Nothing is logged at this level; used as the "admit nothing" floor.
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Verbose,
}

impl LogLevel {
    pub fn as_i8(self) -> i8 {
        match self {
            LogLevel::NonMessage => -1,
            LogLevel::None => 0,
            LogLevel::Error => 1,
            LogLevel::Warning => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
            LogLevel::Verbose => 5,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            -1 => Some(LogLevel::NonMessage),
            0 => Some(LogLevel::None),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            5 => Some(LogLevel::Verbose),
            _ => None,
        }
    }

    /// Single-letter marker used when formatting message lines.
    pub fn marker(self) -> &'static str {
        match self {
            LogLevel::NonMessage => "C",
            LogLevel::None => "-",
            LogLevel::Error => "E",
            LogLevel::Warning => "W",
            LogLevel::Info => "I",
            LogLevel::Debug => "D",
            LogLevel::Verbose => "V",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::NonMessage => "nonmessage",
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
        };
        write!(f, "{}", name)
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i8::deserialize(deserializer)?;
        LogLevel::from_i8(value)
            .ok_or_else(|| D::Error::custom(format!("invalid log level: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::NonMessage < LogLevel::None);
        assert!(LogLevel::None < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Verbose);
    }

    #[test]
    fn test_integer_round_trip() {
        for value in -1..=5 {
            let level = LogLevel::from_i8(value).expect("valid level");
            assert_eq!(level.as_i8(), value);
        }
        assert!(LogLevel::from_i8(6).is_none());
        assert!(LogLevel::from_i8(-2).is_none());
    }

    #[test]
    fn test_serde_uses_integers() {
        let encoded = serde_json::to_string(&LogLevel::Debug).expect("serialize failed");
        assert_eq!(encoded, "4");
        let decoded: LogLevel = serde_json::from_str("2").expect("deserialize failed");
        assert_eq!(decoded, LogLevel::Warning);
        assert!(serde_json::from_str::<LogLevel>("9").is_err());
    }
}
