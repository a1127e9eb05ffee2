//! # Built-in Resource Parameters
//!
//! Ready-made [`EnvParam`](crate::lifecycle::EnvParam) implementations that can be
//! declared directly as record fields:
//!
//! | Type            | Text form                     | Acquired resource        |
//! |-----------------|-------------------------------|--------------------------|
//! | [`Listener`]    | `tcp://0.0.0.0:8080`          | a bound `TcpListener`    |
//! | [`SecretParam`] | `file:DB_PASSWORD`, `data:,x` | a handle on the secret   |
//!
//! Both decode through their `FromStr` implementation, so they need no registry
//! entry, and both are discovered by the orchestrator after decoding.

mod listener;
mod secret;

pub use listener::{Listener, ListenerError};
pub use secret::SecretParam;
