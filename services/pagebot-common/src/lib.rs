//! PageBot Common - Shared types, configuration, and logging.
//!
//! This crate provides the pieces every PageBot service-side module needs:
//! - `config`: JSON config file with environment-variable overrides
//! - `error`: unified error type with HTTP status mapping
//! - `logging`: tracing setup, trace ids, and relay metrics

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Error, Result};
