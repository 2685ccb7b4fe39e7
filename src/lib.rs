//! Memberflow - a subscription lifecycle engine for membership platforms
//!
//! Memberflow validates and commits the lifecycle operations on a member's
//! subscriptions: checkout, renewal, cancellation and moving a product
//! between subscriptions. Grace and warning windows are derived from dates
//! on every read and never stored.
//!
//! # Features
//!
//! - **Eligibility**: every rule is checked and all failures are reported
//!   per field before anything is written
//! - **Guarded writes**: updates carry the state they were validated
//!   against, so concurrent changes surface as errors instead of overwrites
//! - **Database**: SeaORM-backed store (`database` feature, on by default)
//! - **Testing**: in-memory store, fixed clock and recording audit logger
//!   (`test-membership` feature)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use memberflow::{ConfigBuilder, SeaOrmPool};
//! use memberflow::subscriptions::{SeaOrmMembershipStore, SubscriptionService, TracingAuditLogger};
//!
//! #[tokio::main]
//! async fn main() -> memberflow::Result<()> {
//!     memberflow::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let pool = SeaOrmPool::from_config(&config.database).await?;
//!     let store = Arc::new(SeaOrmMembershipStore::new(pool.into_inner()));
//!
//!     let service = SubscriptionService::builder(store.clone(), store, decryptor)
//!         .config(config.engine)
//!         .audit_logger(TracingAuditLogger)
//!         .build();
//!     // hand `service` to your handlers
//!     Ok(())
//! }
//! ```

mod config;
#[cfg(feature = "database")]
pub mod database;
mod error;
pub mod subscriptions;
pub mod utils;

// Re-exports for public API
pub use config::{Config, ConfigBuilder, LoggingConfig};
#[cfg(feature = "database")]
pub use database::{DatabaseConfig, SeaOrmPool};
pub use error::{MemberflowError, Result};
pub use subscriptions::{
    EngineConfig, GraceBoundary, MemberIdentity, Outcome, PeriodUnit, ReasonCode,
    SubscriptionService, ValidationErrors,
};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "memberflow=debug")
/// - `MEMBERFLOW_LOG_JSON`: Set to "true" for JSON formatted logs
///
/// Audit events are emitted under the `memberflow::audit` target, so
/// `RUST_LOG=memberflow::audit=info` isolates the audit trail.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a logging configuration
pub fn init_tracing_with_config(config: &LoggingConfig) {
    let env_filter = EnvFilter::new(&config.level);

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
