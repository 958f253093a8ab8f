//! Server configuration for the Traffic Ops ACME service.

mod service;

pub use service::*;
