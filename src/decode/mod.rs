//! # Structural Decoder
//!
//! Populates a [`Record`] from an [`Environment`] snapshot.
//!
//! ## Field resolution
//!
//! For every declared field the decoder:
//!
//! 1. resolves its key (explicit `key`, or derived from the identifier by
//!    [`to_env_name`]) under the accumulated group prefix and the options prefix,
//! 2. reads the raw text, treating an absent key and an empty value the same way:
//!    the `default` is used when one is declared, otherwise the field reports
//!    *value not set*,
//! 3. asks the [`ParserRegistry`] for a parser. A hit makes the field a leaf,
//!    whatever its shape, and the parsed value is restored through the field's
//!    pointer layers before assignment,
//! 4. without a parser, strips pointer layers and decodes by shape:
//!    - **records** are decoded in place. Empty `Option`s on the way are allocated
//!      first, and the record consumes no key of its own,
//!    - **sequences** split the raw text on `separator` and parse every element,
//!    - **maps** split on `separator`, then each entry once on `kv_separator`,
//!    - anything else is a [`SchemaError`].
//!
//! ## Errors
//!
//! Field errors are collected, never short-circuited: one decode reports every
//! missing key and every bad value. Sequence and map fields fail as a whole, after
//! every element has been attempted. A map entry without its key/value separator is
//! reported immediately as [`FieldErrorKind::InvalidMapItem`]. Schema errors stop the
//! walk and are reported alone.
//!
//! ```rust
//! use app_bootstrap::decode::{decode_as, DecodeOptions, Environment};
//! use app_bootstrap::record;
//! use app_bootstrap::registry::ParserRegistry;
//!
//! #[derive(Debug, Default)]
//! struct Server {
//!     port: u16,
//!     host: String,
//! }
//!
//! record! {
//!     Server {
//!         port: key = "PORT";
//!         host: key = "HOST", default = "0.0.0.0";
//!     }
//! }
//!
//! let env = Environment::from([("PORT", "3000")]);
//! let server: Server = decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();
//! assert_eq!(server.port, 3000);
//! assert_eq!(server.host, "0.0.0.0");
//! ```

mod effective;
mod environment;
mod error;
mod naming;
pub mod record;
mod walker;

pub(crate) use effective::deref_all;
pub use effective::effective_environment;
pub use environment::Environment;
pub use error::{DecodeError, ElementError, FieldError, FieldErrorKind, SchemaError};
pub use naming::to_env_name;
pub use record::{FieldDecl, FieldInspector, FieldSpec, FieldVisitor, Fields, Inspect, Record};

use std::any::{Any, TypeId};
use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BoxError;
use crate::registry::{Overrides, Parser, ParserRegistry};
use walker::Walker;

type OnFieldSet<'o> = Box<dyn FnMut(&str, &dyn Any, bool) + Send + 'o>;

/// Per-call decoding options.
pub struct DecodeOptions<'o> {
    prefix: String,
    on_field_set: Option<OnFieldSet<'o>>,
    overrides: Overrides,
    context: CancellationToken,
}

impl<'o> DecodeOptions<'o> {
    pub fn new() -> Self {
        Self {
            prefix: String::new(),
            on_field_set: None,
            overrides: Overrides::new(),
            context: CancellationToken::new(),
        }
    }

    /// Prepended to every key looked up in the environment.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Called once per assigned field with `(key, value, from_default)`.
    pub fn on_field_set<F>(mut self, on_field_set: F) -> Self
    where
        F: FnMut(&str, &dyn Any, bool) + Send + 'o,
    {
        self.on_field_set = Some(Box::new(on_field_set));
        self
    }

    /// A parser for `T` that takes precedence over the registry for this call.
    pub fn with_parser<T, E, F>(mut self, parse: F) -> Self
    where
        T: Any + Send,
        E: Into<BoxError>,
        F: Fn(&CancellationToken, &str) -> Result<T, E> + Send + Sync + 'static,
    {
        self.overrides.insert(TypeId::of::<T>(), Parser::new(parse));
        self
    }

    /// The token handed to every parser.
    pub fn context(mut self, context: CancellationToken) -> Self {
        self.context = context;
        self
    }
}

impl Default for DecodeOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecodeOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("prefix", &self.prefix)
            .field("on_field_set", &self.on_field_set.is_some())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

/// Decodes `env` into `record`, field by field.
pub fn decode<R: Record>(
    registry: &ParserRegistry,
    record: &mut R,
    env: &Environment,
    mut options: DecodeOptions<'_>,
) -> Result<(), DecodeError> {
    debug!(
        record = std::any::type_name::<R>(),
        prefix = %options.prefix,
        "Decoding record"
    );
    let mut walker = Walker::new(registry, env, &mut options);
    record.visit_fields(&mut Fields::new(&mut walker));
    walker.finish()
}

/// Decodes a fresh `R::default()`.
pub fn decode_as<R: Record>(
    registry: &ParserRegistry,
    env: &Environment,
    options: DecodeOptions<'_>,
) -> Result<R, DecodeError> {
    let mut record = R::default();
    decode(registry, &mut record, env, options)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Limits {
        burst: u32,
        window: Duration,
    }

    record! {
        Limits {
            burst: default = "10";
            window: default = "1s";
        }
    }

    #[derive(Debug, Default)]
    struct Service {
        name: String,
        limits: Option<Limits>,
        weights: HashMap<String, f64>,
        internal: u8,
    }

    record! {
        Service {
            name;
            limits: prefix = "LIMITS_";
            weights: default = "a:1";
            internal: key = "-";
        }
    }

    #[test]
    fn test_nested_option_record_is_allocated() {
        let env = Environment::from([("SVC_NAME", "api"), ("SVC_LIMITS_BURST", "3")]);
        let registry = ParserRegistry::new();
        let service: Service =
            decode_as(&registry, &env, DecodeOptions::new().prefix("SVC_")).unwrap();

        let limits = service.limits.unwrap();
        assert_eq!(service.name, "api");
        assert_eq!(limits.burst, 3);
        assert_eq!(limits.window, Duration::from_secs(1));
        assert_eq!(service.weights.get("a"), Some(&1.0));
        assert_eq!(service.internal, 0);
    }

    #[test]
    fn test_empty_value_counts_as_absent() {
        let env = Environment::from([("NAME", "")]);
        let err = decode_as::<Service>(&ParserRegistry::new(), &env, DecodeOptions::new())
            .unwrap_err();
        assert_eq!(err.missing_keys(), vec!["NAME"]);
    }

    #[test]
    fn test_override_parser() {
        let env = Environment::from([("NAME", "api")]);
        let options = DecodeOptions::new()
            .with_parser(|_, raw: &str| Ok::<_, BoxError>(raw.to_uppercase()));
        let service: Service = decode_as(&ParserRegistry::new(), &env, options).unwrap();
        assert_eq!(service.name, "API");
    }

    #[test]
    fn test_effective_environment() {
        let registry = ParserRegistry::new();
        let env = Environment::from([("NAME", "api"), ("LIMITS_BURST", "7")]);
        let service: Service = decode_as(&registry, &env, DecodeOptions::new()).unwrap();

        let effective = effective_environment(&registry, &service, &env, "");
        let expected: Vec<(&str, &str)> = vec![
            ("LIMITS_BURST", "7"),
            ("LIMITS_WINDOW", "1s"),
            ("NAME", "api"),
            ("WEIGHTS", "a:1"),
        ];
        assert_eq!(
            effective
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
            expected
        );
    }
}
