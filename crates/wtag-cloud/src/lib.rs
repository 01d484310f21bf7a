//! wtag-cloud - HTTP transport for the wireless tag cloud
//!
//! Implements [`wtag_core::ConfigTransport`] against the cloud's JSON API
//! so monitoring configs can be pulled and pushed for real tags.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wtag_cloud::{CloudConfig, CloudTransport};
//!
//! # fn run() -> Result<(), wtag_cloud::CloudError> {
//! let config = CloudConfig::from_env();
//! let transport = Arc::new(CloudTransport::new(&config)?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-exports for convenience
pub use client::{config_family, HttpClient};
pub use config::CloudConfig;
pub use error::{CloudError, CloudResult};
pub use transport::CloudTransport;
