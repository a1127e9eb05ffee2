use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use std::net::Ipv4Addr;

use app_bootstrap::decode::{
    decode, decode_as, effective_environment, DecodeError, DecodeOptions, ElementError,
    Environment, FieldErrorKind, SchemaError,
};
use app_bootstrap::record;
use app_bootstrap::registry::{Describe, ParserRegistry, TypeDescriptor, UnmarshalText};

// =============================================================================
// FIXTURES
// =============================================================================

#[derive(Debug, Default)]
struct Server {
    port: u16,
    host: String,
    timeout: Duration,
}

record! {
    Server {
        port: key = "PORT";
        host: key = "HOST", default = "0.0.0.0";
        timeout: default = "30s";
    }
}

#[derive(Debug, Default, PartialEq)]
struct Tag(String);

impl UnmarshalText for Tag {
    type Err = std::str::Utf8Error;

    fn unmarshal_text(&mut self, text: &[u8]) -> Result<(), Self::Err> {
        self.0 = format!("#{}", std::str::from_utf8(text)?);
        Ok(())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.trim_start_matches('#'))
    }
}

impl Describe for Tag {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::unmarshal::<Self>()
    }
}

#[derive(Debug, Default)]
struct Tags {
    plain: Tag,
    boxed: Box<Tag>,
    optional: Option<Box<Tag>>,
}

record! {
    Tags {
        plain;
        boxed;
        optional;
    }
}

#[derive(Debug)]
struct Addresses {
    plain: Ipv4Addr,
    optional: Option<Ipv4Addr>,
    boxed: Option<Box<Ipv4Addr>>,
    nested: Box<Option<Box<Ipv4Addr>>>,
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            plain: Ipv4Addr::UNSPECIFIED,
            optional: None,
            boxed: None,
            nested: Box::new(None),
        }
    }
}

record! {
    Addresses {
        plain;
        optional;
        boxed;
        nested;
    }
}

#[derive(Debug, Default)]
struct Collections {
    ports: Vec<u16>,
    weights: BTreeMap<String, u32>,
}

record! {
    Collections {
        ports;
        weights: separator = ";", kv_separator = "=";
    }
}

#[derive(Debug, Default)]
struct Database {
    url: String,
    pool_size: u32,
}

record! {
    Database {
        url;
        pool_size: default = "4";
    }
}

#[derive(Debug, Default)]
struct Service {
    name: String,
    primary: Database,
    replica: Option<Database>,
}

record! {
    Service {
        name;
        primary: prefix = "DB_";
        replica: prefix = "REPLICA_";
    }
}

struct Opaque;

impl Default for Opaque {
    fn default() -> Self {
        Opaque
    }
}

impl Describe for Opaque {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::named::<Self>()
    }
}

#[derive(Default)]
struct Broken {
    port: u16,
    opaque: Opaque,
}

record! {
    Broken {
        port;
        opaque;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[test]
fn test_defaults_and_observer() {
    let env = Environment::from([("PORT", "3000")]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&seen);
    let options = DecodeOptions::new().on_field_set(move |key, _value, from_default| {
        observed.lock().unwrap().push((key.to_string(), from_default));
    });

    let server: Server = decode_as(&ParserRegistry::new(), &env, options).unwrap();

    assert_eq!(server.port, 3000);
    assert_eq!(server.host, "0.0.0.0");
    assert_eq!(server.timeout, Duration::from_secs(30));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("PORT".to_string(), false),
            ("HOST".to_string(), true),
            ("TIMEOUT".to_string(), true),
        ]
    );
}

#[test]
fn test_effective_environment_agrees_with_decoded_values() {
    let registry = ParserRegistry::new();
    let env = Environment::from([("PORT", "3000"), ("HOST", "")]);
    let server: Server = decode_as(&registry, &env, DecodeOptions::new()).unwrap();
    assert_eq!(server.host, "0.0.0.0");

    let effective = effective_environment(&registry, &server, &env, "");
    assert_eq!(effective.get("HOST").map(String::as_str), Some("0.0.0.0"));
    assert_eq!(effective.get("PORT").map(String::as_str), Some("3000"));
    assert_eq!(effective.get("TIMEOUT").map(String::as_str), Some("30s"));
}

#[test]
fn test_every_missing_key_is_reported_once() {
    let registry = ParserRegistry::new();
    let err = decode_as::<Service>(&registry, &Environment::new(), DecodeOptions::new())
        .unwrap_err();

    assert_eq!(err.missing_keys(), vec!["DB_URL", "NAME", "REPLICA_URL"]);
    assert!(err.field_errors().iter().all(|field| field.is_value_not_set()));
}

#[test]
fn test_nested_prefixes_and_decode_in_place() {
    let env = Environment::from([
        ("APP_NAME", "billing"),
        ("APP_DB_URL", "postgres://primary"),
        ("APP_REPLICA_URL", "postgres://replica"),
        ("APP_REPLICA_POOL_SIZE", "16"),
    ]);
    let mut service = Service {
        name: "placeholder".into(),
        ..Service::default()
    };

    decode(
        &ParserRegistry::new(),
        &mut service,
        &env,
        DecodeOptions::new().prefix("APP_"),
    )
    .unwrap();

    assert_eq!(service.name, "billing");
    assert_eq!(service.primary.url, "postgres://primary");
    assert_eq!(service.primary.pool_size, 4);
    let replica = service.replica.expect("replica allocated");
    assert_eq!(replica.url, "postgres://replica");
    assert_eq!(replica.pool_size, 16);
}

#[test]
fn test_sequence_reports_every_bad_element() {
    let env = Environment::from([("PORTS", "80,x,443,y"), ("WEIGHTS", "a=1")]);
    let err = decode_as::<Collections>(&ParserRegistry::new(), &env, DecodeOptions::new())
        .unwrap_err();

    let field = match err {
        DecodeError::Field(field) => field,
        other => panic!("expected a single field error, got {other:?}"),
    };
    assert_eq!(field.key, "PORTS");
    let FieldErrorKind::Elements(elements) = &field.kind else {
        panic!("expected element errors, got {:?}", field.kind);
    };
    let indexes: Vec<usize> = elements
        .iter()
        .map(|element| match element {
            ElementError::Index { index, .. } => *index,
            other => panic!("unexpected element error {other:?}"),
        })
        .collect();
    assert_eq!(indexes, vec![1, 3]);
}

#[test]
fn test_malformed_map_entry_differs_from_bad_value() {
    let registry = ParserRegistry::new();

    let env = Environment::from([("PORTS", "80"), ("WEIGHTS", "a=1;b")]);
    let err = decode_as::<Collections>(&registry, &env, DecodeOptions::new()).unwrap_err();
    let fields = err.field_errors();
    assert_eq!(fields.len(), 1);
    assert!(matches!(
        &fields[0].kind,
        FieldErrorKind::InvalidMapItem { item, separator } if item == "b" && separator == "="
    ));

    let env = Environment::from([("PORTS", "80"), ("WEIGHTS", "a=1;b=heavy")]);
    let err = decode_as::<Collections>(&registry, &env, DecodeOptions::new()).unwrap_err();
    let fields = err.field_errors();
    assert!(matches!(
        &fields[0].kind,
        FieldErrorKind::Elements(elements)
            if matches!(elements.as_slice(), [ElementError::Value { raw, .. }] if raw == "heavy")
    ));
}

#[test]
fn test_collections_decode() {
    let env = Environment::from([("PORTS", "80,443"), ("WEIGHTS", "a=1;b=2")]);
    let collections: Collections =
        decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();

    assert_eq!(collections.ports, vec![80, 443]);
    assert_eq!(
        collections.weights,
        BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
    );
}

#[test]
fn test_unmarshal_text_at_every_pointer_depth() {
    let env = Environment::from([("PLAIN", "a"), ("BOXED", "b"), ("OPTIONAL", "c")]);
    let tags: Tags = decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();

    assert_eq!(tags.plain, Tag("#a".into()));
    assert_eq!(*tags.boxed, Tag("#b".into()));
    assert_eq!(tags.optional, Some(Box::new(Tag("#c".into()))));

    let rendered = [
        tags.plain.to_string(),
        tags.boxed.to_string(),
        tags.optional.map(|tag| tag.to_string()).unwrap_or_default(),
    ];
    assert_eq!(rendered, ["a", "b", "c"]);
}

#[test]
fn test_text_round_trips_at_every_pointer_depth() {
    let env = Environment::from([
        ("PLAIN", "10.0.0.1"),
        ("OPTIONAL", "10.0.0.2"),
        ("BOXED", "10.0.0.3"),
        ("NESTED", "10.0.0.4"),
    ]);
    let addresses: Addresses =
        decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();

    let rendered = [
        addresses.plain.to_string(),
        addresses.optional.map(|ip| ip.to_string()).unwrap_or_default(),
        addresses.boxed.map(|ip| ip.to_string()).unwrap_or_default(),
        (*addresses.nested).map(|ip| ip.to_string()).unwrap_or_default(),
    ];
    let raw: Vec<&str> = ["PLAIN", "OPTIONAL", "BOXED", "NESTED"]
        .iter()
        .filter_map(|key| env.get(key))
        .collect();
    assert_eq!(rendered.iter().map(String::as_str).collect::<Vec<_>>(), raw);
}

#[test]
fn test_registered_parser_wins_over_text_adapter() {
    let mut registry = ParserRegistry::new();
    registry.register(|_, raw: &str| Ok::<_, std::convert::Infallible>(Tag(raw.to_uppercase())));

    let env = Environment::from([("PLAIN", "a"), ("BOXED", "b"), ("OPTIONAL", "c")]);
    let tags: Tags = decode_as(&registry, &env, DecodeOptions::new()).unwrap();

    assert_eq!(tags.plain, Tag("A".into()));
    // The outer layer already decodes through the text adapter.
    assert_eq!(tags.optional, Some(Box::new(Tag("#c".into()))));
}

#[test]
#[should_panic(expected = "already registered")]
fn test_duplicate_registration_panics() {
    let mut registry = ParserRegistry::new();
    registry.register(|_, raw: &str| Ok::<_, std::convert::Infallible>(Tag(raw.into())));
    registry.register(|_, raw: &str| Ok::<_, std::convert::Infallible>(Tag(raw.into())));
}

#[test]
fn test_duplicate_registration_is_reported() {
    let mut registry = ParserRegistry::new();
    let err = registry
        .try_register(|_, raw: &str| humantime::parse_duration(raw))
        .unwrap_err();
    assert!(err.to_string().contains("Duration"));
}

#[test]
fn test_schema_error_stops_the_walk() {
    let err = decode_as::<Broken>(&ParserRegistry::new(), &Environment::new(), DecodeOptions::new())
        .err()
        .expect("schema error");

    assert!(matches!(
        err,
        DecodeError::Schema(SchemaError::NoParser { field: "opaque", .. })
    ));
    assert!(err.field_errors().is_empty());
}

#[test]
fn test_same_input_same_outcome() {
    let registry = ParserRegistry::new();
    let env: Environment = HashMap::from([("PORTS", "1,z"), ("WEIGHTS", "k")])
        .into_iter()
        .collect();

    let first = decode_as::<Collections>(&registry, &env, DecodeOptions::new())
        .unwrap_err()
        .to_string();
    let second = decode_as::<Collections>(&registry, &env, DecodeOptions::new())
        .unwrap_err()
        .to_string();
    assert_eq!(first, second);
}
