//! WhatsApp relay: webhook ingestion, pub/sub fan-out and pluggable processors.

pub mod bus;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processors;
pub mod store;
pub mod subscriber;
pub mod webhook;
