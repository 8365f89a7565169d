//! gatebot
//!
//! Runtime host and worker for a tiered channel-access subscription bot.
//! The host provisions a writable data directory and launches exactly one
//! worker; the worker keeps its durable state in a local SQLite file and
//! sweeps subscriptions once a day.

pub mod config;
pub mod host;
pub mod services;
pub mod store;
pub mod worker;
