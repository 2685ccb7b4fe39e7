//! Subscription lifecycle engine.
//!
//! Checkout, renewal, cancellation and cross-plan product migration for a
//! member's subscriptions. Every processor runs the eligibility battery
//! first and performs its single write only on a clean result.
//!
//! # Example
//!
//! ```rust,ignore
//! use memberflow::subscriptions::{
//!     CheckoutRequest, MemberIdentity, Outcome, SubscriptionService, TracingAuditLogger,
//! };
//!
//! let service = SubscriptionService::builder(store.clone(), store, decryptor)
//!     .config(config.engine)
//!     .audit_logger(TracingAuditLogger)
//!     .build();
//!
//! let identity = MemberIdentity::new(member_id, partner_id);
//! let request = CheckoutRequest::new("pro").with_payment_gateway(3);
//!
//! match service.checkout(&identity, &request).await? {
//!     Outcome::Accepted(subscription) => println!("expires {}", subscription.expiration_date),
//!     Outcome::Rejected(errors) => println!("rejected: {errors}"),
//! }
//! ```

pub mod audit;
pub mod cancellation;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod http;
pub mod listing;
pub mod migration;
pub mod payment;
pub mod periods;
pub mod plans;
pub mod renewal;
pub mod requests;
#[cfg(feature = "database")]
pub mod sea_orm_store;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;

// Domain exports
pub use types::{
    Member, MemberIdentity, MemberSubscription, PartnerGateway, PaymentGateway, PayoutGatewayLink,
    PlanCapacity, Product, SubscriptionPlan, SubscriptionStatus,
};
// Config exports
pub use config::{EngineConfig, GraceBoundary, PeriodUnit};
// Error exports
pub use error::SubscriptionError;
// Validation exports
pub use validation::{Outcome, ReasonCode, ValidationErrors, fields};
// Period exports
pub use periods::{PeriodCalculator, PeriodState};
// Clock exports
pub use clock::{Clock, SharedClock, SystemClock};
// Storage exports
pub use payment::{PaymentDetailsDecryptor, supports_payin};
pub use storage::{MembershipStore, PlanCatalog, ProductReassignment, RenewalUpdate, StatusUpdate};
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmMembershipStore;
// Processor exports
pub use cancellation::CancellationProcessor;
pub use checkout::CheckoutProcessor;
pub use eligibility::{
    ApprovedCancellation, ApprovedCheckout, ApprovedMigration, ApprovedRenewal, EligibilityValidator,
};
pub use migration::MigrationProcessor;
pub use plans::PlanReader;
pub use renewal::RenewalProcessor;
pub use requests::{CancellationRequest, CheckoutRequest, ProductSwitchRequest, RenewalRequest};
pub use service::{SubscriptionService, SubscriptionServiceBuilder};
// Listing exports
pub use listing::{
    ListingPage, ListingQuery, ListingSort, PaginationMeta, SortOrder, SubscriptionListItem,
    SubscriptionListing,
};
// Audit exports
pub use audit::{
    NoOpAuditLogger, SubscriptionAuditEvent, SubscriptionAuditLogger, TracingAuditLogger,
};
// HTTP exports
pub use http::{OperationResponse, ValidationErrorBody};

#[cfg(any(test, feature = "test-membership"))]
pub use audit::RecordingAuditLogger;
#[cfg(any(test, feature = "test-membership"))]
pub use clock::FixedClock;
#[cfg(any(test, feature = "test-membership"))]
pub use payment::StaticPaymentDetails;
#[cfg(any(test, feature = "test-membership"))]
pub use storage::test::InMemoryMembershipStore;
