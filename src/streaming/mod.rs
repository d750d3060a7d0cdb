//! Event publishing via Apache Iggy (C6).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌─────────────────────┐
//! │   Relay Loop     │────▶│  IggyPublisher   │────▶│     Apache Iggy      │
//! │  (per event)     │     │  (serialize,     │     │  (stream + topic)    │
//! │                  │     │   retry, send)   │     │                      │
//! └──────────────────┘     └──────────────────┘     └─────────────────────┘
//! ```
//!
//! There is exactly one topic (`events`); downstream consumers route on
//! the `event_name` transport attribute, not on topic identity.

mod iggy_publisher;
mod topics;

pub use iggy_publisher::IggyPublisher;
pub use topics::{STREAM_NAME, TopicConfig};
