//! precache - offline asset cache for a single web application
//!
//! Caches a deployment's build assets under a versioned partition on install,
//! drops partitions from older deployments on activate, and answers requests
//! cache-first for assets and network-first with a cache fallback otherwise.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod journal;
pub mod manifest;
pub mod network;
pub mod storage;
pub mod ui;
pub mod worker;

pub use error::{PrecacheError, PrecacheResult};
