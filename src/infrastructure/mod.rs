//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Unified error types
//! - `metrics`: Prometheus metrics helpers
//! - `redis`: Lazily connected Redis handle shared by the ACK store and cluster bus

pub mod config;
pub mod error;
pub mod metrics;
pub mod redis;
