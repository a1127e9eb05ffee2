//! # Type Descriptors
//!
//! A [`TypeDescriptor`] is the runtime identity of a decodable type: its `TypeId`, its
//! name, and a [`Kind`] describing its shape. Descriptors are produced at compile time
//! through the [`Describe`] trait, so the decoder never needs reflection. It only
//! follows the function pointers captured here.
//!
//! ## Pointer layers
//!
//! `Box<T>` and `Option<T>` are pointer layers. A descriptor for `Option<Box<T>>` is a
//! chain of two [`Kind::Pointer`] nodes ending in `T`. The chain is never collapsed:
//! parser lookup counts the layers it strips as a separate *pointer depth*, and
//! [`TypeDescriptor::restore`] re-applies exactly that many layers to a parsed value.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::decode::{FieldInspector, FieldVisitor, Fields, Inspect, Record};
use crate::error::BoxError;
use crate::lifecycle::EnvParam;
use crate::registry::text::{TextDecode, UnmarshalText};

/// A type-erased decoded value.
pub type Value = Box<dyn Any + Send>;

pub(crate) type DecodeFn = fn(&str) -> Result<Value, BoxError>;
pub(crate) type WrapFn = fn(Value) -> Result<Value, Value>;
type AssignFn = fn(&mut dyn Any, Value) -> Result<(), Value>;
type AsParamFn = for<'a> fn(&'a dyn Any) -> Option<&'a dyn EnvParam>;
type DerefFn = for<'a> fn(&'a dyn Any) -> Option<&'a dyn Any>;
type DerefMutFn = for<'a> fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>;
type PushFn = fn(&mut Value, Value) -> Result<(), Value>;
type InsertFn = fn(&mut Value, Value, Value) -> Result<(), Value>;
pub(crate) type VisitFn = for<'a, 'b> fn(&'a mut dyn Any, &'b mut dyn FieldVisitor<'a>);
pub(crate) type InspectFn = for<'a, 'b> fn(&'a dyn Any, &'b mut dyn FieldInspector<'a>);

/// Types that can appear as a field of a decoded record.
///
/// Implemented here for primitives, strings, common std types, pointer layers
/// (`Box`, `Option`), sequences (`Vec`) and maps (`HashMap`, `BTreeMap`). Records get
/// it from the [`record!`](crate::record) macro. Your own leaf types pick one of the
/// descriptor constructors:
///
/// ```rust
/// use app_bootstrap::registry::{Describe, TypeDescriptor};
///
/// #[derive(Debug)]
/// struct Percent(u8);
///
/// impl std::str::FromStr for Percent {
///     type Err = std::num::ParseIntError;
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         s.trim_end_matches('%').parse().map(Percent)
///     }
/// }
///
/// impl Describe for Percent {
///     fn describe() -> TypeDescriptor {
///         TypeDescriptor::text::<Self>()
///     }
/// }
/// ```
pub trait Describe: Any + Send + Sized {
    fn describe() -> TypeDescriptor;
}

/// Primitive kinds served by the built-in parser table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    String,
}

/// The shape of a described type.
#[derive(Clone)]
pub enum Kind {
    Primitive(Primitive),
    /// An opaque type, decodable through the registry or its text capability.
    Named(Option<TextDecode>),
    Pointer(PointerShape),
    Sequence(SequenceShape),
    Map(MapShape),
    Record(RecordShape),
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Kind::Named(text) => f.debug_tuple("Named").field(&text.is_some()).finish(),
            Kind::Pointer(p) => f.debug_tuple("Pointer").field(&p.inner).finish(),
            Kind::Sequence(s) => f.debug_tuple("Sequence").field(&s.elem).finish(),
            Kind::Map(m) => f.debug_tuple("Map").field(&m.key).field(&m.value).finish(),
            Kind::Record(_) => f.write_str("Record"),
        }
    }
}

/// One level of indirection (`Box<T>` or `Option<T>`).
#[derive(Clone)]
pub struct PointerShape {
    pub(crate) inner: Box<TypeDescriptor>,
    pub(crate) wrap: WrapFn,
    pub(crate) deref: DerefFn,
    pub(crate) deref_mut: DerefMutFn,
}

impl PointerShape {
    pub fn inner(&self) -> &TypeDescriptor {
        &self.inner
    }
}

#[derive(Clone)]
pub struct SequenceShape {
    pub(crate) elem: Box<TypeDescriptor>,
    pub(crate) new: fn() -> Value,
    pub(crate) push: PushFn,
}

impl SequenceShape {
    pub fn elem(&self) -> &TypeDescriptor {
        &self.elem
    }
}

#[derive(Clone)]
pub struct MapShape {
    pub(crate) key: Box<TypeDescriptor>,
    pub(crate) value: Box<TypeDescriptor>,
    pub(crate) new: fn() -> Value,
    pub(crate) insert: InsertFn,
}

impl MapShape {
    pub fn key(&self) -> &TypeDescriptor {
        &self.key
    }

    pub fn value(&self) -> &TypeDescriptor {
        &self.value
    }
}

#[derive(Clone)]
pub struct RecordShape {
    pub(crate) visit: VisitFn,
    pub(crate) inspect: InspectFn,
    pub(crate) new: fn() -> Value,
}

/// Runtime identity and shape of a decodable type.
///
/// Two descriptors are equal iff they denote the same static type.
#[derive(Clone)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    kind: Kind,
    assign: AssignFn,
    lifecycle: Option<AsParamFn>,
}

impl TypeDescriptor {
    fn of<T: Any + Send>(kind: Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind,
            assign: assign::<T>,
            lifecycle: None,
        }
    }

    pub(crate) fn primitive<T: Any + Send>(primitive: Primitive) -> Self {
        Self::of::<T>(Kind::Primitive(primitive))
    }

    /// An opaque type that only the parser registry can decode.
    pub fn named<T: Any + Send>() -> Self {
        Self::of::<T>(Kind::Named(None))
    }

    /// A type that decodes itself by value through [`FromStr`].
    pub fn text<T>() -> Self
    where
        T: FromStr + Any + Send,
        T::Err: Into<BoxError>,
    {
        Self::of::<T>(Kind::Named(Some(TextDecode::ByValue {
            decode: from_str_value::<T>,
        })))
    }

    /// A type that decodes itself in place through [`UnmarshalText`].
    pub fn unmarshal<T>() -> Self
    where
        T: UnmarshalText + Default + Any + Send,
    {
        Self::of::<T>(Kind::Named(Some(TextDecode::ByReference {
            decode: unmarshal_boxed::<T>,
            target: TypeId::of::<Box<T>>(),
            deref: unbox::<T>,
        })))
    }

    pub fn boxed<T: Describe>() -> Self {
        Self::of::<Box<T>>(Kind::Pointer(PointerShape {
            inner: Box::new(T::describe()),
            wrap: wrap_box::<T>,
            deref: deref_box::<T>,
            deref_mut: deref_mut_box::<T>,
        }))
    }

    pub fn optional<T: Describe>() -> Self {
        Self::of::<Option<T>>(Kind::Pointer(PointerShape {
            inner: Box::new(T::describe()),
            wrap: wrap_option::<T>,
            deref: deref_option::<T>,
            deref_mut: deref_mut_option::<T>,
        }))
    }

    pub fn sequence<T: Describe>() -> Self {
        Self::of::<Vec<T>>(Kind::Sequence(SequenceShape {
            elem: Box::new(T::describe()),
            new: new_value::<Vec<T>>,
            push: push_vec::<T>,
        }))
    }

    pub fn hash_map<K, V>() -> Self
    where
        K: Describe + Eq + Hash,
        V: Describe,
    {
        Self::of::<HashMap<K, V>>(Kind::Map(MapShape {
            key: Box::new(K::describe()),
            value: Box::new(V::describe()),
            new: new_value::<HashMap<K, V>>,
            insert: insert_hash_map::<K, V>,
        }))
    }

    pub fn btree_map<K, V>() -> Self
    where
        K: Describe + Ord,
        V: Describe,
    {
        Self::of::<BTreeMap<K, V>>(Kind::Map(MapShape {
            key: Box::new(K::describe()),
            value: Box::new(V::describe()),
            new: new_value::<BTreeMap<K, V>>,
            insert: insert_btree_map::<K, V>,
        }))
    }

    pub fn record<R: Record>() -> Self {
        Self::of::<R>(Kind::Record(RecordShape {
            visit: visit_record::<R>,
            inspect: inspect_record::<R>,
            new: new_value::<R>,
        }))
    }

    /// Marks the described type as a resource parameter.
    ///
    /// `T` must be the type this descriptor was built for.
    pub fn with_lifecycle<T: EnvParam + Any>(mut self) -> Self {
        debug_assert_eq!(self.id, TypeId::of::<T>(), "lifecycle type mismatch");
        self.lifecycle = Some(as_param::<T>);
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_resource(&self) -> bool {
        self.lifecycle.is_some()
    }

    /// The descriptor left after stripping every pointer layer.
    pub fn base(&self) -> &TypeDescriptor {
        let mut current = self;
        while let Kind::Pointer(pointer) = &current.kind {
            current = &pointer.inner;
        }
        current
    }

    /// Pointer descriptors from the outermost layer inwards.
    pub(crate) fn pointer_layers(&self) -> Vec<&TypeDescriptor> {
        let mut layers = Vec::new();
        let mut current = self;
        while let Kind::Pointer(pointer) = &current.kind {
            layers.push(current);
            current = &pointer.inner;
        }
        layers
    }

    pub fn pointer_depth(&self) -> usize {
        self.pointer_layers().len()
    }

    /// Re-wraps `value` (a value of the type found `depth` layers down) into the
    /// outer `depth` pointer layers of this descriptor.
    pub fn restore(&self, mut value: Value, depth: usize) -> Result<Value, Value> {
        for layer in self.pointer_layers().into_iter().take(depth).rev() {
            if let Kind::Pointer(pointer) = &layer.kind {
                value = (pointer.wrap)(value)?;
            }
        }
        Ok(value)
    }

    pub(crate) fn wrap(&self, value: Value) -> Result<Value, Value> {
        match &self.kind {
            Kind::Pointer(pointer) => (pointer.wrap)(value),
            _ => Ok(value),
        }
    }

    pub(crate) fn assign(&self, slot: &mut dyn Any, value: Value) -> Result<(), Value> {
        (self.assign)(slot, value)
    }

    pub(crate) fn as_resource<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn EnvParam> {
        self.lifecycle.and_then(|as_param| as_param(value))
    }

    /// A fresh, fully allocated value for records and pointers to records.
    pub(crate) fn allocate(&self) -> Option<Value> {
        match &self.kind {
            Kind::Record(shape) => Some((shape.new)()),
            Kind::Pointer(pointer) => {
                let inner = pointer.inner.allocate()?;
                (pointer.wrap)(inner).ok()
            }
            _ => None,
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("resource", &self.lifecycle.is_some())
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// ERASED OPERATIONS
// =============================================================================

fn assign<T: Any + Send>(slot: &mut dyn Any, value: Value) -> Result<(), Value> {
    let Some(slot) = slot.downcast_mut::<T>() else {
        return Err(value);
    };
    *slot = *value.downcast::<T>()?;
    Ok(())
}

fn as_param<T: EnvParam + Any>(value: &dyn Any) -> Option<&dyn EnvParam> {
    value.downcast_ref::<T>().map(|param| param as &dyn EnvParam)
}

fn new_value<T: Default + Any + Send>() -> Value {
    Box::new(T::default())
}

fn from_str_value<T>(raw: &str) -> Result<Value, BoxError>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    raw.parse::<T>()
        .map(|value| Box::new(value) as Value)
        .map_err(Into::into)
}

fn unmarshal_boxed<T>(raw: &str) -> Result<Value, BoxError>
where
    T: UnmarshalText + Default + Any + Send,
{
    let mut target = Box::new(T::default());
    if let Err(err) = target.unmarshal_text(raw.as_bytes()) {
        return Err(err.into());
    }
    Ok(Box::new(target) as Value)
}

fn unbox<T: Any + Send>(value: Value) -> Result<Value, Value> {
    let pointer: Box<Box<T>> = value.downcast()?;
    let target: Box<T> = *pointer;
    Ok(target as Value)
}

fn wrap_box<T: Any + Send>(value: Value) -> Result<Value, Value> {
    value
        .downcast::<T>()
        .map(|target| Box::new(target) as Value)
}

fn wrap_option<T: Any + Send>(value: Value) -> Result<Value, Value> {
    value
        .downcast::<T>()
        .map(|target| Box::new(Some(*target)) as Value)
}

fn deref_box<T: Any>(value: &dyn Any) -> Option<&dyn Any> {
    value.downcast_ref::<Box<T>>().map(|b| &**b as &dyn Any)
}

fn deref_mut_box<T: Any>(value: &mut dyn Any) -> Option<&mut dyn Any> {
    value
        .downcast_mut::<Box<T>>()
        .map(|b| &mut **b as &mut dyn Any)
}

fn deref_option<T: Any>(value: &dyn Any) -> Option<&dyn Any> {
    value
        .downcast_ref::<Option<T>>()
        .and_then(Option::as_ref)
        .map(|t| t as &dyn Any)
}

fn deref_mut_option<T: Any>(value: &mut dyn Any) -> Option<&mut dyn Any> {
    value
        .downcast_mut::<Option<T>>()
        .and_then(Option::as_mut)
        .map(|t| t as &mut dyn Any)
}

fn push_vec<T: Any + Send>(acc: &mut Value, item: Value) -> Result<(), Value> {
    let item = item.downcast::<T>()?;
    match acc.downcast_mut::<Vec<T>>() {
        Some(items) => {
            items.push(*item);
            Ok(())
        }
        None => Err(item as Value),
    }
}

fn insert_hash_map<K, V>(acc: &mut Value, key: Value, value: Value) -> Result<(), Value>
where
    K: Any + Send + Eq + Hash,
    V: Any + Send,
{
    let key = key.downcast::<K>()?;
    let value = value.downcast::<V>()?;
    match acc.downcast_mut::<HashMap<K, V>>() {
        Some(map) => {
            map.insert(*key, *value);
            Ok(())
        }
        None => Err(key as Value),
    }
}

fn insert_btree_map<K, V>(acc: &mut Value, key: Value, value: Value) -> Result<(), Value>
where
    K: Any + Send + Ord,
    V: Any + Send,
{
    let key = key.downcast::<K>()?;
    let value = value.downcast::<V>()?;
    match acc.downcast_mut::<BTreeMap<K, V>>() {
        Some(map) => {
            map.insert(*key, *value);
            Ok(())
        }
        None => Err(key as Value),
    }
}

fn visit_record<'a, R: Record>(value: &'a mut dyn Any, visitor: &mut dyn FieldVisitor<'a>) {
    if let Some(record) = value.downcast_mut::<R>() {
        record.visit_fields(&mut Fields::new(visitor));
    }
}

fn inspect_record<'a, R: Record>(value: &'a dyn Any, inspector: &mut dyn FieldInspector<'a>) {
    if let Some(record) = value.downcast_ref::<R>() {
        record.inspect_fields(&mut Inspect::new(inspector));
    }
}

// =============================================================================
// PROVIDED DESCRIPTIONS
// =============================================================================

macro_rules! describe_primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescriptor {
                    TypeDescriptor::primitive::<$ty>(Primitive::$kind)
                }
            }
        )*
    };
}

describe_primitive! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => String,
}

macro_rules! describe_named {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescriptor {
                    TypeDescriptor::named::<$ty>()
                }
            }
        )*
    };
}

describe_named! {
    Duration,
    url::Url,
    chrono_tz::Tz,
    tracing::Level,
}

macro_rules! describe_text {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescriptor {
                    TypeDescriptor::text::<$ty>()
                }
            }
        )*
    };
}

describe_text! {
    PathBuf,
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
    SocketAddr,
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::boxed::<T>()
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::optional::<T>()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::sequence::<T>()
    }
}

impl<K: Describe + Eq + Hash, V: Describe> Describe for HashMap<K, V> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::hash_map::<K, V>()
    }
}

impl<K: Describe + Ord, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::btree_map::<K, V>()
    }
}
