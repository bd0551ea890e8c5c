//! Tickstream Watch - keeps live views of market and user channels.
//!
//! This crate wires the SDK's streaming client, REST client and listen-key
//! manager into a long-running service that logs every view change. It is
//! the reference consumer of the synchronization layer.
//!
//! # Components
//!
//! - [`config`]: Environment-driven configuration
//! - [`service`]: View orchestration and shutdown

pub mod config;
pub mod service;

pub use config::{ConfigError, WatchConfig};
pub use service::{Describe, ServiceError, WatchService};
