//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod mapper;
pub mod repositories;
pub mod telemetry;
