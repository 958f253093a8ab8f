//! Database migrations for the Traffic Ops ACME tables.

pub use sea_orm_migration::prelude::*;

mod migration;
pub use migration::Migrator;
