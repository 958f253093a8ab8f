//! Traffic Vault: the secret store holding delivery service SSL keys and
//! CDN DNSSEC keys.
//!
//! Backends implement [`TrafficVault`] and are selected by name at startup
//! through a [`VaultRegistry`]. The store has no transactional link to the
//! relational database even when a backend happens to live in it.

mod backend;
mod errors;
mod models;
mod postgres;
mod registry;

pub use backend::TrafficVault;
pub use errors::VaultError;
pub use models::*;
pub use postgres::PostgresTrafficVault;
pub use registry::{VaultConstructor, VaultRegistry};

pub mod test_utils;
