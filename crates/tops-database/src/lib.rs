//! Database connection, unit-of-work and test utilities

pub use sea_orm;
mod connection;
mod unit_of_work;

pub use connection::{establish_connection, DatabaseError, DbConnection};
pub use unit_of_work::{TxFuture, UnitOfWork};

// Export test utilities for use by other crates in their tests
pub mod test_utils;
