//! # Parser Registry
//!
//! Maps a target type to the function that turns an environment string into a value
//! of that type.
//!
//! # Lookup order
//!
//! [`ParserRegistry::lookup`] resolves a [`TypeDescriptor`] by trying, in order:
//!
//! 1. an exact match in the explicitly registered parsers,
//! 2. the type's own text capability ([`text`]), which handles every pointer
//!    layer itself,
//! 3. the built-in parser for the type's primitive kind.
//!
//! If all three miss and the type is a pointer (`Box<T>`, `Option<T>`), one layer is
//! stripped, the pointer depth is incremented and the search restarts on `T`. The
//! returned depth tells the decoder how many layers to re-apply with
//! [`TypeDescriptor::restore`].
//!
//! # Well-known types
//!
//! [`ParserRegistry::new`] comes pre-loaded with `Duration` (humantime syntax),
//! `url::Url`, `chrono_tz::Tz` and `tracing::Level`. Use [`ParserRegistry::empty`]
//! for a registry with only the primitive table.
//!
//! # Registration
//!
//! Registration is a startup-time concern. [`ParserRegistry::register`] panics on a
//! duplicate type, since that is a programming error; [`ParserRegistry::try_register`]
//! reports it instead.

pub mod builtin;
mod descriptor;
pub mod text;

pub use descriptor::{
    Describe, Kind, MapShape, PointerShape, Primitive, RecordShape, SequenceShape,
    TypeDescriptor, Value,
};
pub use text::{TextDecode, TextError, UnmarshalText};

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

type ParseFn = dyn Fn(&CancellationToken, &str) -> Result<Value, BoxError> + Send + Sync;

/// A shareable, type-erased parse function.
///
/// Parsers receive the ambient cancellation token so that long-running parsers can
/// bail out early; most ignore it.
#[derive(Clone)]
pub struct Parser {
    inner: Arc<ParseFn>,
}

impl Parser {
    /// Wraps a typed parse function.
    pub fn new<T, E, F>(parse: F) -> Self
    where
        T: Any + Send,
        E: Into<BoxError>,
        F: Fn(&CancellationToken, &str) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::from_erased(move |ctx, raw| match parse(ctx, raw) {
            Ok(value) => Ok(Box::new(value) as Value),
            Err(err) => Err(err.into()),
        })
    }

    pub(crate) fn from_erased<F>(parse: F) -> Self
    where
        F: Fn(&CancellationToken, &str) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(parse),
        }
    }

    pub fn parse(&self, ctx: &CancellationToken, raw: &str) -> Result<Value, BoxError> {
        (self.inner)(ctx, raw)
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Parser")
    }
}

/// A parser together with the number of pointer layers stripped to find it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub parser: Parser,
    pub depth: usize,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("parser for {type_name} is already registered")]
    Duplicate { type_name: &'static str },
}

/// Per-call parser overrides, consulted before the registry.
pub type Overrides = HashMap<TypeId, Parser>;

pub struct ParserRegistry {
    parsers: HashMap<TypeId, (&'static str, Parser)>,
    primitives: HashMap<Primitive, Parser>,
}

impl ParserRegistry {
    /// A registry with the primitive table and the well-known named types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register(|_, raw| builtin::parse_duration(raw))
            .register(|_, raw| builtin::parse_url(raw))
            .register(|_, raw| builtin::parse_location(raw))
            .register(|_, raw| builtin::parse_log_level(raw));
        registry
    }

    /// A registry with the primitive table only.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
            primitives: builtin::primitive_table(),
        }
    }

    fn insert_typed<T: Any>(&mut self, parser: Parser) -> Result<(), RegistryError> {
        let id = TypeId::of::<T>();
        if self.parsers.contains_key(&id) {
            return Err(RegistryError::Duplicate {
                type_name: type_name::<T>(),
            });
        }
        self.parsers.insert(id, (type_name::<T>(), parser));
        Ok(())
    }

    /// Registers a parser for `T`, failing if one already exists.
    pub fn try_register<T, E, F>(&mut self, parse: F) -> Result<&mut Self, RegistryError>
    where
        T: Any + Send,
        E: Into<BoxError>,
        F: Fn(&CancellationToken, &str) -> Result<T, E> + Send + Sync + 'static,
    {
        self.insert_typed::<T>(Parser::new(parse))?;
        Ok(self)
    }

    /// Registers a parser for `T`.
    ///
    /// # Panics
    ///
    /// Panics if a parser for `T` is already registered.
    pub fn register<T, E, F>(&mut self, parse: F) -> &mut Self
    where
        T: Any + Send,
        E: Into<BoxError>,
        F: Fn(&CancellationToken, &str) -> Result<T, E> + Send + Sync + 'static,
    {
        if let Err(err) = self.insert_typed::<T>(Parser::new(parse)) {
            panic!("{err}");
        }
        self
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.parsers.contains_key(&TypeId::of::<T>())
    }

    /// Resolves a parser for `ty` and the pointer depth it was found at.
    pub fn lookup(&self, ty: &TypeDescriptor) -> Option<Resolved> {
        self.lookup_with(&Overrides::new(), ty)
    }

    /// Like [`lookup`](Self::lookup), with `overrides` taking precedence over the
    /// registered parsers at every depth.
    pub fn lookup_with(&self, overrides: &Overrides, ty: &TypeDescriptor) -> Option<Resolved> {
        let mut current = ty;
        let mut depth = 0;
        loop {
            if let Some(parser) = self.find(overrides, current) {
                return Some(Resolved { parser, depth });
            }
            match current.kind() {
                Kind::Pointer(pointer) => {
                    current = pointer.inner();
                    depth += 1;
                }
                _ => return None,
            }
        }
    }

    fn find(&self, overrides: &Overrides, ty: &TypeDescriptor) -> Option<Parser> {
        if let Some(parser) = overrides.get(&ty.id()) {
            return Some(parser.clone());
        }
        if let Some((_, parser)) = self.parsers.get(&ty.id()) {
            return Some(parser.clone());
        }
        if let Some(parser) = text::adapter(ty) {
            return Some(parser);
        }
        match ty.kind() {
            Kind::Primitive(primitive) => self.primitives.get(primitive).cloned(),
            _ => None,
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.parsers.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("ParserRegistry")
            .field("parsers", &names)
            .finish_non_exhaustive()
    }
}
