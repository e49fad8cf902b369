//! # Thermolink Library
//!
//! Serial JSON ingestion and logging for a thermistor-array instrument.
//!
//! This library provides the core pipeline for reading newline-delimited
//! JSON from a serial-connected instrument, classifying each line as a
//! sensor reading or a configuration event, and buffering both streams in
//! bounded in-memory logs that an operator can inspect, export, and clear.

pub mod config;
pub mod error;
pub mod serial;
pub mod decode;
pub mod record;
pub mod store;
pub mod ingest;
pub mod control;
pub mod export;
