//! # Record Schemas
//!
//! A record is a struct whose fields are decoded from the environment. Instead of
//! runtime reflection, each record carries a compile-time field table: the
//! [`Record`] trait hands each field, together with its static [`FieldDecl`] and
//! [`TypeDescriptor`], to a visitor.
//!
//! You rarely implement [`Record`] by hand. The [`record!`](crate::record) macro
//! generates it from a terse field list:
//!
//! ```rust
//! use app_bootstrap::record;
//!
//! #[derive(Debug, Default)]
//! struct Database {
//!     url: String,
//!     pool_size: u32,
//! }
//!
//! #[derive(Debug, Default)]
//! struct Config {
//!     port: u16,
//!     host: String,
//!     tags: Vec<String>,
//!     database: Database,
//!     internal: bool,
//! }
//!
//! record! {
//!     Database {
//!         url: key = "URL";
//!         pool_size: default = "4";
//!     }
//! }
//!
//! record! {
//!     Config {
//!         port: key = "PORT";
//!         host: key = "HOST", default = "0.0.0.0";
//!         tags: separator = ";";
//!         database: prefix = "DB_";
//!         internal: skip;
//!     }
//! }
//! ```
//!
//! # Field options
//!
//! | Option          | Meaning                                              | Default           |
//! |-----------------|------------------------------------------------------|-------------------|
//! | `key`           | environment key, `-` excludes the field              | derived from name |
//! | `default`       | raw text used when the key is absent or empty        | none (required)   |
//! | `separator`     | element separator for sequences and maps             | `,`               |
//! | `kv_separator`  | key/value separator for map entries                  | `:`               |
//! | `prefix`        | prepended to every key of a nested record            | empty             |
//! | `skip`          | never decode this field                              |                   |
//!
//! Struct fields left out of the list are not decoded at all.

use std::any::Any;

use super::naming::to_env_name;
use crate::registry::{Describe, TypeDescriptor};

/// A struct decodable field by field.
pub trait Record: Default + Send + Sync + 'static {
    /// Hands every declared field to the decoder, mutably.
    fn visit_fields<'a>(&'a mut self, fields: &mut Fields<'a, '_>);

    /// Hands every declared field to a read-only pass.
    fn inspect_fields<'a>(&'a self, fields: &mut Inspect<'a, '_>);
}

/// Receives mutable field slots during decoding.
pub trait FieldVisitor<'a> {
    fn visit(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, slot: &'a mut dyn Any);
}

/// Receives shared field references during read-only passes.
pub trait FieldInspector<'a> {
    fn inspect(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, value: &'a dyn Any);
}

pub struct Fields<'a, 'v> {
    visitor: &'v mut dyn FieldVisitor<'a>,
}

impl<'a, 'v> Fields<'a, 'v> {
    pub fn new(visitor: &'v mut dyn FieldVisitor<'a>) -> Self {
        Self { visitor }
    }

    pub fn field<T: Describe>(&mut self, decl: FieldDecl, slot: &'a mut T) -> &mut Self {
        self.visitor.visit(&decl, &T::describe(), slot);
        self
    }
}

pub struct Inspect<'a, 'v> {
    inspector: &'v mut dyn FieldInspector<'a>,
}

impl<'a, 'v> Inspect<'a, 'v> {
    pub fn new(inspector: &'v mut dyn FieldInspector<'a>) -> Self {
        Self { inspector }
    }

    pub fn field<T: Describe>(&mut self, decl: FieldDecl, value: &'a T) -> &mut Self {
        self.inspector.inspect(&decl, &T::describe(), value);
        self
    }
}

/// Static declaration of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    ident: &'static str,
    key: Option<&'static str>,
    default: Option<&'static str>,
    separator: &'static str,
    kv_separator: &'static str,
    prefix: &'static str,
    skip: bool,
}

impl FieldDecl {
    pub const fn new(ident: &'static str) -> Self {
        Self {
            ident,
            key: None,
            default: None,
            separator: ",",
            kv_separator: ":",
            prefix: "",
            skip: false,
        }
    }

    pub const fn key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }

    pub const fn default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn separator(mut self, separator: &'static str) -> Self {
        self.separator = separator;
        self
    }

    pub const fn kv_separator(mut self, separator: &'static str) -> Self {
        self.kv_separator = separator;
        self
    }

    pub const fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    pub const fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn ident(&self) -> &'static str {
        self.ident
    }

    /// Resolves this declaration under the accumulated prefix of its parents.
    pub fn resolve(&self, parent_prefix: &str) -> FieldSpec {
        let group_prefix = format!("{parent_prefix}{}", self.prefix);
        let name = match self.key {
            Some(key) => key.to_string(),
            None => to_env_name(self.ident),
        };
        let ignored = self.skip || name == "-";
        FieldSpec {
            key: if ignored {
                name
            } else {
                format!("{group_prefix}{name}")
            },
            default: self.default,
            separator: self.separator,
            kv_separator: self.kv_separator,
            ignored,
            group_prefix,
        }
    }
}

/// A field declaration resolved for one decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub default: Option<&'static str>,
    pub separator: &'static str,
    pub kv_separator: &'static str,
    pub ignored: bool,
    /// Prefix for the keys of a nested record held by this field.
    pub group_prefix: String,
}

/// Implements [`Record`] and [`Describe`](crate::registry::Describe) for a struct.
///
/// See the [module documentation](crate::decode::record) for the syntax.
#[macro_export]
macro_rules! record {
    ($ty:ty { $( $field:ident $( : $( $opt:ident $( = $val:expr )? ),+ )? );* $(;)? }) => {
        impl $crate::decode::Record for $ty {
            fn visit_fields<'a>(&'a mut self, fields: &mut $crate::decode::Fields<'a, '_>) {
                $(
                    fields.field(
                        $crate::record!(@decl $field $( : $( $opt $( = $val )? ),+ )?),
                        &mut self.$field,
                    );
                )*
            }

            fn inspect_fields<'a>(&'a self, fields: &mut $crate::decode::Inspect<'a, '_>) {
                $(
                    fields.field(
                        $crate::record!(@decl $field $( : $( $opt $( = $val )? ),+ )?),
                        &self.$field,
                    );
                )*
            }
        }

        impl $crate::registry::Describe for $ty {
            fn describe() -> $crate::registry::TypeDescriptor {
                $crate::registry::TypeDescriptor::record::<Self>()
            }
        }
    };
    (@decl $field:ident $( : $( $opt:ident $( = $val:expr )? ),+ )?) => {
        $crate::decode::FieldDecl::new(stringify!($field)) $( $( .$opt( $( $val )? ) )+ )?
    };
}
