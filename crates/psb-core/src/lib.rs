//! Core of the proxy subscription bot.
//!
//! Link extraction, protocol classification and subscription file building live
//! here, together with the update pipeline that drives them. Telegram and git
//! sit behind ports (traits) implemented in adapter crates.

pub mod builder;
pub mod categories;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extractor;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod scheduler;
pub mod security;
pub mod userdb;
pub mod utils;

pub use errors::{BuildError, Error, Result};
