//! Database connection pooling.
//!
//! The membership store runs on SeaORM over PostgreSQL.

pub mod config;
pub mod sea_orm_pool;

pub use config::{DatabaseConfig, redact_database_url};
pub use sea_orm_pool::SeaOrmPool;
pub use sea_orm;
