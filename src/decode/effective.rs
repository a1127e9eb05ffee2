use std::any::Any;
use std::collections::BTreeMap;

use super::record::{FieldDecl, FieldInspector, Inspect, Record};
use super::Environment;
use crate::registry::{Kind, ParserRegistry, TypeDescriptor};

/// The environment as the application effectively sees it.
///
/// Every key the record declares maps to the value decoding would use for it: the
/// environment value when non-empty, else the default, else the empty string. Nested records contribute their
/// prefixed keys. Handy for logging the full configuration surface at startup.
pub fn effective_environment<R: Record>(
    registry: &ParserRegistry,
    record: &R,
    env: &Environment,
    prefix: &str,
) -> BTreeMap<String, String> {
    let mut collector = KeyCollector {
        registry,
        prefix: String::new(),
        keys: Vec::new(),
    };
    record.inspect_fields(&mut Inspect::new(&mut collector));

    collector
        .keys
        .into_iter()
        .map(|(key, default)| {
            let key = format!("{prefix}{key}");
            let value = env
                .raw_or_default(&key, default)
                .map(|(value, _)| value)
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

struct KeyCollector<'r> {
    registry: &'r ParserRegistry,
    prefix: String,
    keys: Vec<(String, Option<&'static str>)>,
}

impl KeyCollector<'_> {
    fn collect(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, value: &dyn Any) {
        let spec = decl.resolve(&self.prefix);
        if spec.ignored {
            return;
        }
        if self.registry.lookup(ty).is_some() {
            self.keys.push((spec.key, spec.default));
            return;
        }
        match ty.base().kind() {
            Kind::Sequence(_) | Kind::Map(_) => self.keys.push((spec.key, spec.default)),
            Kind::Record(shape) => {
                let Some(record) = deref_all(ty, value) else {
                    return;
                };
                let parent = std::mem::replace(&mut self.prefix, spec.group_prefix);
                (shape.inspect)(record, self);
                self.prefix = parent;
            }
            _ => {}
        }
    }
}

impl<'a> FieldInspector<'a> for KeyCollector<'_> {
    fn inspect(&mut self, decl: &FieldDecl, ty: &TypeDescriptor, value: &'a dyn Any) {
        self.collect(decl, ty, value);
    }
}

/// Follows non-empty pointer layers down to the base value.
pub(crate) fn deref_all<'a>(ty: &TypeDescriptor, value: &'a dyn Any) -> Option<&'a dyn Any> {
    match ty.kind() {
        Kind::Pointer(pointer) => deref_all(pointer.inner(), (pointer.deref)(value)?),
        _ => Some(value),
    }
}
