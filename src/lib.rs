//! Edge Tunnel - control-plane HTTP proxy for NAT-isolated service domains
//!
//! Requests addressed to a remote site are checked, resolved and forwarded
//! through an already-established tunnel to the site's on-prem agent. The
//! service-mesh dashboard running on each site gets its own integration with
//! per-site session tokens and aggregated overview calls.

pub mod application;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
