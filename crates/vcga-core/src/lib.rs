//! Core of the VCGA WhatsApp auto-responder.
//!
//! Classification, record lookup, reply composition, delivery retry, daily
//! counters and the poll loop live here. The bridge HTTP client is an adapter
//! behind [`ports::BridgePort`].

pub mod classifier;
pub mod config;
pub mod controller;
pub mod counters;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod poll;
pub mod ports;
pub mod records;
pub mod reply;
pub mod utils;

pub use errors::{Error, Result};
