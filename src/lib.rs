//! # App Bootstrap
//!
//! > **Typed environment configuration and resource lifecycles for service processes.**
//!
//! This crate turns the process environment into a typed configuration record, brings
//! up the resources that record describes (listeners, secrets, trust material), runs
//! your code, and tears everything down again.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Report everything, fail once
//! A misconfigured service should tell you *every* missing or malformed variable in
//! one run, not one per restart. Decoding collects field errors into one aggregate,
//! lifecycle phases collect per-resource failures, and the job scheduler collects
//! every real job failure.
//!
//! ### No reflection, no globals
//! Record schemas are compile-time field tables generated by [`record!`]. Parsers
//! live in a [`ParserRegistry`](registry::ParserRegistry) instance you construct
//! and pass around.
//!
//! ### Symmetric lifecycles
//! Whatever is acquired is released, in reverse order, even when startup fails
//! halfway through.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. Decoding ([`registry`], [`decode`])
//! - **Role**: Maps types to parsers and walks records field by field.
//! - **Key items**: [`ParserRegistry`](registry::ParserRegistry),
//!   [`Describe`](registry::Describe), [`decode`](decode::decode),
//!   [`record!`].
//!
//! ### 2. Lifecycle ([`lifecycle`], [`params`])
//! - **Role**: Discovers resource parameters in a decoded record and drives them through
//!   Configure → Acquire → Shutdown.
//! - **Key items**: [`EnvParam`](lifecycle::EnvParam),
//!   [`Orchestrator`](lifecycle::Orchestrator), [`Listener`](params::Listener),
//!   [`SecretParam`](params::SecretParam).
//!
//! ### 3. Concurrency ([`scheduler`])
//! - **Role**: Runs independent long-running jobs together and stops them together.
//! - **Key items**: [`run_all`](scheduler::run_all), [`job`](scheduler::job).
//!
//! ### 4. Collaborators ([`secrets`], [`trust`], [`app`])
//! - **Role**: Secret storages, CA and client certificates, application identity.
//!
//! ### 5. The Runner ([`runtime`])
//! - **Role**: Ties it all together behind one call.
//! - **Key items**: [`run`](runtime::run), [`ActionConfig`](runtime::ActionConfig),
//!   [`build_context`](runtime::build_context).
//!
//! ## 🚀 Quick Start
//!
//! ```rust
//! use app_bootstrap::decode::{decode_as, DecodeOptions, Environment};
//! use app_bootstrap::record;
//! use app_bootstrap::registry::ParserRegistry;
//! use std::time::Duration;
//!
//! #[derive(Debug, Default)]
//! struct Config {
//!     port: u16,
//!     host: String,
//!     timeout: Duration,
//! }
//!
//! record! {
//!     Config {
//!         port: key = "PORT";
//!         host: key = "HOST", default = "0.0.0.0";
//!         timeout: default = "30s";
//!     }
//! }
//!
//! let env = Environment::from([("PORT", "3000")]);
//! let config: Config = decode_as(&ParserRegistry::new(), &env, DecodeOptions::new()).unwrap();
//! assert_eq!(config.port, 3000);
//! assert_eq!(config.host, "0.0.0.0");
//! assert_eq!(config.timeout, Duration::from_secs(30));
//! ```
//!
//! ### Running the Demo
//!
//! ```bash
//! HTTP_ADDR=tcp://127.0.0.1:8080 RUST_LOG=info cargo run -p bootstrap-sample
//! ```

pub mod app;
pub mod decode;
pub mod error;
pub mod lifecycle;
pub mod params;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod secrets;
pub mod trust;
