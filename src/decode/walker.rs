use std::any::Any;

use tracing::{debug, trace};

use super::error::{DecodeError, ElementError, FieldError, FieldErrorKind, SchemaError};
use super::record::{FieldDecl, FieldSpec, FieldVisitor};
use super::{DecodeOptions, Environment};
use crate::error::MultiError;
use crate::registry::{Kind, MapShape, ParserRegistry, Resolved, SequenceShape, TypeDescriptor, Value};

/// The decoding visitor. Walks one record tree, collecting field errors and
/// stopping at the first schema error.
pub(crate) struct Walker<'r, 'o> {
    registry: &'r ParserRegistry,
    env: &'r Environment,
    options: &'r mut DecodeOptions<'o>,
    prefix: String,
    errors: Vec<FieldError>,
    schema: Option<SchemaError>,
}

impl<'r, 'o> Walker<'r, 'o> {
    pub(crate) fn new(
        registry: &'r ParserRegistry,
        env: &'r Environment,
        options: &'r mut DecodeOptions<'o>,
    ) -> Self {
        Self {
            registry,
            env,
            options,
            prefix: String::new(),
            errors: Vec::new(),
            schema: None,
        }
    }

    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if let Some(schema) = self.schema {
            return Err(DecodeError::Schema(schema));
        }
        match DecodeError::from_fields(self.errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lookup(&self, ty: &TypeDescriptor) -> Option<Resolved> {
        self.registry.lookup_with(&self.options.overrides, ty)
    }

    /// The full environment key of a field: options prefix + resolved key.
    fn env_key(&self, spec: &FieldSpec) -> String {
        format!("{}{}", self.options.prefix, spec.key)
    }

    /// Raw text for a field and whether it came from the default.
    fn raw_value(&self, spec: &FieldSpec) -> Option<(String, bool)> {
        self.env.raw_or_default(&self.env_key(spec), spec.default)
    }

    fn not_set(&mut self, spec: &FieldSpec, ty: &TypeDescriptor) {
        let key = self.env_key(spec);
        trace!(key, type_name = ty.name(), "Value not set");
        self.errors.push(FieldError {
            key,
            type_name: ty.name(),
            kind: FieldErrorKind::ValueNotSet,
        });
    }

    fn failed(&mut self, spec: &FieldSpec, ty: &TypeDescriptor, kind: FieldErrorKind) {
        self.errors.push(FieldError {
            key: self.env_key(spec),
            type_name: ty.name(),
            kind,
        });
    }

    fn set_value(
        &mut self,
        decl: &FieldDecl,
        spec: &FieldSpec,
        ty: &TypeDescriptor,
        slot: &mut dyn Any,
    ) -> Result<(), SchemaError> {
        // 1. Anything with a parser is a leaf, whatever its shape
        if let Some(resolved) = self.lookup(ty) {
            let Some((raw, from_default)) = self.raw_value(spec) else {
                self.not_set(spec, ty);
                return Ok(());
            };
            match resolved.parser.parse(&self.options.context, &raw) {
                Ok(value) => {
                    let value = ty
                        .restore(value, resolved.depth)
                        .map_err(|_| mismatch(decl, ty))?;
                    self.assign(decl, spec, ty, slot, value, from_default)?;
                }
                Err(source) => self.failed(spec, ty, FieldErrorKind::Parse(source)),
            }
            return Ok(());
        }

        // 2. Structural shapes, reached through any number of pointer layers
        let base = ty.base();
        match base.kind() {
            Kind::Record(shape) => {
                let target = descend(decl, ty, slot)?;
                let parent = std::mem::replace(&mut self.prefix, spec.group_prefix.clone());
                (shape.visit)(target, self);
                self.prefix = parent;
                Ok(())
            }
            Kind::Sequence(shape) => {
                let Some((raw, from_default)) = self.raw_value(spec) else {
                    self.not_set(spec, ty);
                    return Ok(());
                };
                if let Some(value) = self.decode_sequence(decl, spec, ty, shape, &raw)? {
                    let value = ty
                        .restore(value, ty.pointer_depth())
                        .map_err(|_| mismatch(decl, ty))?;
                    self.assign(decl, spec, ty, slot, value, from_default)?;
                }
                Ok(())
            }
            Kind::Map(shape) => {
                let Some((raw, from_default)) = self.raw_value(spec) else {
                    self.not_set(spec, ty);
                    return Ok(());
                };
                if let Some(value) = self.decode_map(decl, spec, ty, shape, &raw)? {
                    let value = ty
                        .restore(value, ty.pointer_depth())
                        .map_err(|_| mismatch(decl, ty))?;
                    self.assign(decl, spec, ty, slot, value, from_default)?;
                }
                Ok(())
            }
            _ => Err(SchemaError::NoParser {
                field: decl.ident(),
                type_name: ty.name(),
            }),
        }
    }

    fn decode_sequence(
        &mut self,
        decl: &FieldDecl,
        spec: &FieldSpec,
        ty: &TypeDescriptor,
        shape: &SequenceShape,
        raw: &str,
    ) -> Result<Option<Value>, SchemaError> {
        let elem = shape.elem();
        let resolved = self.lookup(elem).ok_or(SchemaError::NoParser {
            field: decl.ident(),
            type_name: elem.name(),
        })?;

        let mut items = (shape.new)();
        let mut failures = MultiError::new();
        for (index, part) in split_items(raw, spec.separator).enumerate() {
            match resolved.parser.parse(&self.options.context, part) {
                Ok(value) => {
                    let value = elem
                        .restore(value, resolved.depth)
                        .map_err(|_| mismatch(decl, elem))?;
                    (shape.push)(&mut items, value).map_err(|_| mismatch(decl, ty))?;
                }
                Err(source) => failures.push(ElementError::Index { index, source }),
            }
        }

        if !failures.is_empty() {
            self.failed(spec, ty, FieldErrorKind::Elements(failures));
            return Ok(None);
        }
        Ok(Some(items))
    }

    fn decode_map(
        &mut self,
        decl: &FieldDecl,
        spec: &FieldSpec,
        ty: &TypeDescriptor,
        shape: &MapShape,
        raw: &str,
    ) -> Result<Option<Value>, SchemaError> {
        let (key_ty, value_ty) = (shape.key(), shape.value());
        let key_parser = self.lookup(key_ty).ok_or(SchemaError::NoParser {
            field: decl.ident(),
            type_name: key_ty.name(),
        })?;
        let value_parser = self.lookup(value_ty).ok_or(SchemaError::NoParser {
            field: decl.ident(),
            type_name: value_ty.name(),
        })?;

        let mut map = (shape.new)();
        let mut failures = MultiError::new();
        for item in split_items(raw, spec.separator) {
            let Some((raw_key, raw_value)) = item.split_once(spec.kv_separator) else {
                self.failed(
                    spec,
                    ty,
                    FieldErrorKind::InvalidMapItem {
                        item: item.to_string(),
                        separator: spec.kv_separator.to_string(),
                    },
                );
                return Ok(None);
            };

            let key = match key_parser.parser.parse(&self.options.context, raw_key) {
                Ok(key) => key_ty
                    .restore(key, key_parser.depth)
                    .map_err(|_| mismatch(decl, key_ty))?,
                Err(source) => {
                    failures.push(ElementError::Key {
                        raw: raw_key.to_string(),
                        source,
                    });
                    continue;
                }
            };
            let value = match value_parser.parser.parse(&self.options.context, raw_value) {
                Ok(value) => value_ty
                    .restore(value, value_parser.depth)
                    .map_err(|_| mismatch(decl, value_ty))?,
                Err(source) => {
                    failures.push(ElementError::Value {
                        raw: raw_value.to_string(),
                        source,
                    });
                    continue;
                }
            };
            (shape.insert)(&mut map, key, value).map_err(|_| mismatch(decl, ty))?;
        }

        if !failures.is_empty() {
            self.failed(spec, ty, FieldErrorKind::Elements(failures));
            return Ok(None);
        }
        Ok(Some(map))
    }

    fn assign(
        &mut self,
        decl: &FieldDecl,
        spec: &FieldSpec,
        ty: &TypeDescriptor,
        slot: &mut dyn Any,
        value: Value,
        from_default: bool,
    ) -> Result<(), SchemaError> {
        ty.assign(slot, value).map_err(|_| mismatch(decl, ty))?;
        let key = self.env_key(spec);
        debug!(key, type_name = ty.name(), from_default, "Field set");
        if let Some(on_field_set) = self.options.on_field_set.as_mut() {
            on_field_set(&key, &*slot, from_default);
        }
        Ok(())
    }
}

impl<'a> FieldVisitor<'a> for Walker<'_, '_> {
    fn visit(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, slot: &'a mut dyn Any) {
        if self.schema.is_some() {
            return;
        }
        let spec = decl.resolve(&self.prefix);
        if spec.ignored {
            return;
        }
        if let Err(err) = self.set_value(decl, &spec, ty, slot) {
            self.schema = Some(err);
        }
    }
}

/// Follows the pointer layers of a record field down to the record itself,
/// allocating every empty `Option` on the way.
fn descend<'s>(
    decl: &FieldDecl,
    ty: &TypeDescriptor,
    slot: &'s mut dyn Any,
) -> Result<&'s mut dyn Any, SchemaError> {
    let Kind::Pointer(pointer) = ty.kind() else {
        return Ok(slot);
    };
    if (pointer.deref)(&*slot).is_none() {
        let fresh = ty.allocate().ok_or_else(|| mismatch(decl, ty))?;
        ty.assign(slot, fresh).map_err(|_| mismatch(decl, ty))?;
    }
    let inner = (pointer.deref_mut)(slot).ok_or_else(|| mismatch(decl, ty))?;
    descend(decl, pointer.inner(), inner)
}

/// Splits composite raw text. An empty text, only reachable through an empty
/// default, holds no items.
fn split_items<'s>(raw: &'s str, separator: &'s str) -> impl Iterator<Item = &'s str> {
    raw.split(separator).filter(move |_| !raw.is_empty())
}

fn mismatch(decl: &FieldDecl, ty: &TypeDescriptor) -> SchemaError {
    SchemaError::TypeMismatch {
        field: decl.ident(),
        type_name: ty.name(),
    }
}
