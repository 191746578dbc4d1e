//! Rockwire Client Library
//!
//! High-level device access on top of the transport crate:
//! - `DeviceQueries`: one typed helper per device query
//! - `PropertyAggregator`: the dependent query graph behind `get_prop`
//! - `ClientConfig`: TOML configuration for device and cloud clients
//! - `logging`: tracing subscriber bootstrap

pub mod aggregator;
pub mod config;
pub mod logging;
pub mod queries;

pub use aggregator::{AggregationError, DeviceProperty, DockSummary, PropertyAggregator};
pub use config::ClientConfig;
pub use queries::DeviceQueries;
