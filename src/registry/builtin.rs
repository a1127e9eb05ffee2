//! Built-in parsers: the primitive table and the well-known named types.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use super::descriptor::{Primitive, Value};
use super::Parser;
use crate::error::BoxError;

#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("invalid boolean {0:?}")]
    Bool(String),

    #[error("invalid duration {raw:?}: {source}")]
    Duration {
        raw: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid time zone {raw:?}: {reason}")]
    Location { raw: String, reason: String },

    #[error("resolving the host time zone: {0}")]
    LocalZone(#[source] iana_time_zone::GetTimezoneError),

    #[error("invalid log level {0:?}")]
    LogLevel(String),
}

/// Booleans accept `1`, `t`, `true` and `0`, `f`, `false`, in lower, upper or title case.
pub fn parse_bool(raw: &str) -> Result<bool, BuiltinError> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(BuiltinError::Bool(other.to_string())),
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration, BuiltinError> {
    humantime::parse_duration(raw).map_err(|source| BuiltinError::Duration {
        raw: raw.to_string(),
        source,
    })
}

pub fn parse_url(raw: &str) -> Result<url::Url, url::ParseError> {
    url::Url::parse(raw)
}

/// IANA zone names. The empty string is UTC, `Local` is the zone of the host.
pub fn parse_location(raw: &str) -> Result<chrono_tz::Tz, BuiltinError> {
    match raw {
        "" => Ok(chrono_tz::Tz::UTC),
        "Local" => {
            let host = iana_time_zone::get_timezone().map_err(BuiltinError::LocalZone)?;
            zone(&host)
        }
        name => zone(name),
    }
}

fn zone(name: &str) -> Result<chrono_tz::Tz, BuiltinError> {
    chrono_tz::Tz::from_str(name).map_err(|reason| BuiltinError::Location {
        raw: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Log level names, case-insensitive. `fatal` and `panic` collapse into `ERROR`.
pub fn parse_log_level(raw: &str) -> Result<Level, BuiltinError> {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" | "fatal" | "panic" => Ok(Level::ERROR),
        _ => Err(BuiltinError::LogLevel(raw.to_string())),
    }
}

fn from_str<T>(raw: &str) -> Result<Value, BoxError>
where
    T: FromStr + Send + 'static,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.parse::<T>() {
        Ok(value) => Ok(Box::new(value)),
        Err(err) => Err(Box::new(err)),
    }
}

fn primitive_parser(primitive: Primitive) -> Parser {
    let parse: fn(&str) -> Result<Value, BoxError> = match primitive {
        Primitive::Bool => |raw| Ok(Box::new(parse_bool(raw)?)),
        Primitive::I8 => from_str::<i8>,
        Primitive::I16 => from_str::<i16>,
        Primitive::I32 => from_str::<i32>,
        Primitive::I64 => from_str::<i64>,
        Primitive::Isize => from_str::<isize>,
        Primitive::U8 => from_str::<u8>,
        Primitive::U16 => from_str::<u16>,
        Primitive::U32 => from_str::<u32>,
        Primitive::U64 => from_str::<u64>,
        Primitive::Usize => from_str::<usize>,
        Primitive::F32 => from_str::<f32>,
        Primitive::F64 => from_str::<f64>,
        Primitive::String => |raw| Ok(Box::new(raw.to_string())),
    };
    Parser::from_erased(move |_ctx, raw| parse(raw))
}

pub(crate) fn primitive_table() -> HashMap<Primitive, Parser> {
    [
        Primitive::Bool,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::Isize,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::Usize,
        Primitive::F32,
        Primitive::F64,
        Primitive::String,
    ]
    .into_iter()
    .map(|primitive| (primitive, primitive_parser(primitive)))
    .collect()
}
