//! Text-decodable adapter.
//!
//! Types that know how to decode themselves from text get a parser for free, at any
//! pointer depth. Two capabilities exist:
//!
//! - **by value**: [`std::str::FromStr`], declared with [`TypeDescriptor::text`].
//! - **by reference**: [`UnmarshalText`], declared with [`TypeDescriptor::unmarshal`].
//!   The decoder allocates a fresh `Box<T>` and lets the value fill itself in. When
//!   the field's innermost pointer layer is that same `Box<T>`, the allocation is
//!   adopted as-is instead of being unwrapped and re-boxed.

use std::any::TypeId;

use thiserror::Error;

use super::descriptor::{DecodeFn, Kind, TypeDescriptor, Value, WrapFn};
use super::Parser;
use crate::error::BoxError;

/// In-place text decoding, for types whose decoding needs an existing value.
///
/// ```rust
/// use app_bootstrap::registry::UnmarshalText;
///
/// #[derive(Default)]
/// struct Flags(Vec<String>);
///
/// impl UnmarshalText for Flags {
///     type Err = std::str::Utf8Error;
///
///     fn unmarshal_text(&mut self, text: &[u8]) -> Result<(), Self::Err> {
///         self.0 = std::str::from_utf8(text)?.split('|').map(str::to_owned).collect();
///         Ok(())
///     }
/// }
/// ```
pub trait UnmarshalText {
    type Err: Into<BoxError>;

    fn unmarshal_text(&mut self, text: &[u8]) -> Result<(), Self::Err>;
}

/// The text capability of a named type.
#[derive(Clone, Copy)]
pub enum TextDecode {
    ByValue {
        decode: DecodeFn,
    },
    ByReference {
        /// Produces a `Box<T>`.
        decode: DecodeFn,
        /// `TypeId` of `Box<T>`.
        target: TypeId,
        /// `Box<T>` to `T`.
        deref: WrapFn,
    },
}

/// A text-decodable type rejected its input.
#[derive(Debug, Error)]
#[error("unmarshalling {type_name}: {source}")]
pub struct TextError {
    pub type_name: &'static str,
    #[source]
    pub source: BoxError,
}

/// Builds a parser for `ty` when its base type carries a text capability.
pub(crate) fn adapter(ty: &TypeDescriptor) -> Option<Parser> {
    let Kind::Named(Some(text)) = ty.base().kind() else {
        return None;
    };
    let text = *text;
    let ty = ty.clone();
    Some(Parser::from_erased(move |_ctx, raw| decode(&ty, text, raw)))
}

fn decode(ty: &TypeDescriptor, text: TextDecode, raw: &str) -> Result<Value, BoxError> {
    let type_name = ty.base().name();
    let failed = |source: BoxError| TextError { type_name, source };
    let mismatch = |_: Value| TextError {
        type_name,
        source: format!("cannot restore pointer layers of {}", ty.name()).into(),
    };

    match text {
        TextDecode::ByValue { decode } => {
            let value = decode(raw).map_err(failed)?;
            Ok(ty.restore(value, ty.pointer_depth()).map_err(mismatch)?)
        }
        TextDecode::ByReference {
            decode,
            target,
            deref,
        } => {
            let pointer = decode(raw).map_err(failed)?;
            let layers = ty.pointer_layers();
            let Some((innermost, outer)) = layers.split_last() else {
                return Ok(deref(pointer).map_err(mismatch)?);
            };
            let mut value = if innermost.id() == target {
                pointer
            } else {
                innermost
                    .wrap(deref(pointer).map_err(mismatch)?)
                    .map_err(mismatch)?
            };
            for layer in outer.iter().rev() {
                value = layer.wrap(value).map_err(mismatch)?;
            }
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Describe;
    use std::net::Ipv4Addr;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Default, PartialEq)]
    struct Upper(String);

    impl UnmarshalText for Upper {
        type Err = std::str::Utf8Error;

        fn unmarshal_text(&mut self, text: &[u8]) -> Result<(), Self::Err> {
            self.0 = std::str::from_utf8(text)?.to_uppercase();
            Ok(())
        }
    }

    impl Describe for Upper {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::unmarshal::<Self>()
        }
    }

    #[test]
    fn test_by_value_at_depth_zero() {
        let parser = adapter(&Ipv4Addr::describe()).unwrap();
        let value = parser.parse(&CancellationToken::new(), "10.0.0.1").unwrap();
        assert_eq!(*value.downcast::<Ipv4Addr>().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn test_by_reference_unboxes_at_depth_zero() {
        let parser = adapter(&Upper::describe()).unwrap();
        let value = parser.parse(&CancellationToken::new(), "abc").unwrap();
        assert_eq!(*value.downcast::<Upper>().unwrap(), Upper("ABC".into()));
    }

    #[test]
    fn test_by_reference_adopts_box() {
        let parser = adapter(&Option::<Box<Upper>>::describe()).unwrap();
        let value = parser.parse(&CancellationToken::new(), "xy").unwrap();
        let value = value.downcast::<Option<Box<Upper>>>().unwrap();
        assert_eq!(*value, Some(Box::new(Upper("XY".into()))));
    }

    #[test]
    fn test_by_reference_rewraps_option() {
        let parser = adapter(&Option::<Upper>::describe()).unwrap();
        let value = parser.parse(&CancellationToken::new(), "q").unwrap();
        assert_eq!(*value.downcast::<Option<Upper>>().unwrap(), Some(Upper("Q".into())));
    }

    #[test]
    fn test_decode_failure_names_type() {
        let parser = adapter(&Ipv4Addr::describe()).unwrap();
        let err = parser.parse(&CancellationToken::new(), "nope").unwrap_err();
        let expected = format!("unmarshalling {}", std::any::type_name::<Ipv4Addr>());
        assert!(err.to_string().starts_with(&expected));
    }

    #[test]
    fn test_no_capability() {
        assert!(adapter(&u8::describe()).is_none());
        assert!(adapter(&std::time::Duration::describe()).is_none());
    }
}
