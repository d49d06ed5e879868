//! PostgreSQL persistence layer for nimbus: connection management,
//! migrations, and tenancy-enforced query functions for every entity.

pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod pool;
pub mod queries;

pub use error::{StoreError, StoreResult};
