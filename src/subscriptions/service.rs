//! Service facade bundling the lifecycle processors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{MemberflowError, Result};

use super::audit::{NoOpAuditLogger, SubscriptionAuditLogger};
use super::cancellation::CancellationProcessor;
use super::checkout::CheckoutProcessor;
use super::clock::{SharedClock, SystemClock};
use super::config::EngineConfig;
use super::eligibility::EligibilityValidator;
use super::listing::{ListingPage, ListingQuery, SubscriptionListing};
use super::migration::MigrationProcessor;
use super::payment::PaymentDetailsDecryptor;
use super::plans::PlanReader;
use super::renewal::RenewalProcessor;
use super::requests::{CancellationRequest, CheckoutRequest, ProductSwitchRequest, RenewalRequest};
use super::storage::{MembershipStore, PlanCatalog};
use super::types::{MemberIdentity, MemberSubscription, Product, SubscriptionPlan};
use super::validation::Outcome;

/// All lifecycle operations over one store, catalog, decryptor, clock and
/// audit logger.
///
/// When an operation deadline is configured, an operation that overruns it
/// is dropped and reported as [`MemberflowError::Timeout`]. Dropping the
/// future rolls back any transaction it had open.
///
/// # Example
///
/// ```rust,ignore
/// use memberflow::subscriptions::{SubscriptionService, TracingAuditLogger};
///
/// let service = SubscriptionService::builder(store.clone(), store, decryptor)
///     .config(config.engine)
///     .audit_logger(TracingAuditLogger)
///     .build();
///
/// match service.checkout(&identity, &request).await? {
///     Outcome::Accepted(subscription) => { /* 201 */ }
///     Outcome::Rejected(errors) => { /* 400 */ }
/// }
/// ```
pub struct SubscriptionService<S, P, D, A = NoOpAuditLogger>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    checkout: CheckoutProcessor<S, P, D, A>,
    renewal: RenewalProcessor<S, P, D, A>,
    cancellation: CancellationProcessor<S, P, D, A>,
    migration: MigrationProcessor<S, P, D, A>,
    listing: SubscriptionListing<S, P>,
    plans: PlanReader<P>,
    timeout: Option<Duration>,
}

impl<S, P, D> SubscriptionService<S, P, D>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    /// Service with default engine settings, the system clock and no audit
    /// trail.
    pub fn new(store: Arc<S>, catalog: Arc<P>, decryptor: Arc<D>) -> Self {
        Self::builder(store, catalog, decryptor).build()
    }

    pub fn builder(
        store: Arc<S>,
        catalog: Arc<P>,
        decryptor: Arc<D>,
    ) -> SubscriptionServiceBuilder<S, P, D> {
        SubscriptionServiceBuilder {
            store,
            catalog,
            decryptor,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            audit: NoOpAuditLogger,
            timeout: None,
        }
    }
}

impl<S, P, D, A> SubscriptionService<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger,
{
    pub async fn checkout(
        &self,
        identity: &MemberIdentity,
        request: &CheckoutRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        self.with_deadline("checkout", self.checkout.checkout(identity, request))
            .await
    }

    pub async fn renew(
        &self,
        identity: &MemberIdentity,
        request: &RenewalRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        self.with_deadline("renewal", self.renewal.renew(identity, request))
            .await
    }

    pub async fn cancel(
        &self,
        identity: &MemberIdentity,
        request: &CancellationRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        self.with_deadline("cancellation", self.cancellation.cancel(identity, request))
            .await
    }

    pub async fn migrate(
        &self,
        identity: &MemberIdentity,
        request: &ProductSwitchRequest,
    ) -> Result<Outcome<Product>> {
        self.with_deadline("product_migration", self.migration.migrate(identity, request))
            .await
    }

    pub async fn list(&self, identity: &MemberIdentity, query: &ListingQuery) -> Result<ListingPage> {
        self.with_deadline("listing", self.listing.list(identity, query))
            .await
    }

    /// Catalog lookup for a single plan.
    pub async fn plan(&self, plan_id: &str) -> Result<SubscriptionPlan> {
        self.with_deadline("plan_lookup", self.plans.plan(plan_id)).await
    }

    /// Operation deadline in force, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(limit) = self.timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?limit, "operation exceeded its deadline");
                Err(MemberflowError::Timeout(limit))
            }
        }
    }
}

/// Builder for [`SubscriptionService`].
#[must_use = "builder does nothing until you call build()"]
pub struct SubscriptionServiceBuilder<S, P, D, A = NoOpAuditLogger> {
    store: Arc<S>,
    catalog: Arc<P>,
    decryptor: Arc<D>,
    config: EngineConfig,
    clock: SharedClock,
    audit: A,
    timeout: Option<Duration>,
}

impl<S, P, D, A> SubscriptionServiceBuilder<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger + Clone,
{
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Deadline for every operation; overrides `operation_timeout_secs`.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn audit_logger<B: SubscriptionAuditLogger + Clone>(self, audit: B) -> SubscriptionServiceBuilder<S, P, D, B> {
        SubscriptionServiceBuilder {
            store: self.store,
            catalog: self.catalog,
            decryptor: self.decryptor,
            config: self.config,
            clock: self.clock,
            audit,
            timeout: self.timeout,
        }
    }

    pub fn build(self) -> SubscriptionService<S, P, D, A> {
        let timeout = self.timeout.or_else(|| self.config.operation_timeout());
        let validator = EligibilityValidator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            self.decryptor,
            self.config.clone(),
            Arc::clone(&self.clock),
        );

        SubscriptionService {
            checkout: CheckoutProcessor::new(validator.clone()).with_audit_logger(self.audit.clone()),
            renewal: RenewalProcessor::new(validator.clone()).with_audit_logger(self.audit.clone()),
            cancellation: CancellationProcessor::new(validator.clone())
                .with_audit_logger(self.audit.clone()),
            migration: MigrationProcessor::new(validator).with_audit_logger(self.audit),
            listing: SubscriptionListing::new(
                self.store,
                Arc::clone(&self.catalog),
                self.config,
                self.clock,
            ),
            plans: PlanReader::new(self.catalog),
            timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::audit::RecordingAuditLogger;
    use crate::subscriptions::clock::FixedClock;
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use crate::subscriptions::types::PaymentGateway;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    struct SlowDecryptor;

    #[async_trait]
    impl PaymentDetailsDecryptor for SlowDecryptor {
        async fn decrypt(&self, _encrypted: &str) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::json!({"payin": true}))
        }
    }

    fn store() -> Arc<InMemoryMembershipStore> {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.seed_member("m1", "partner-a");
        store.seed_gateway(PaymentGateway {
            id: 1,
            name: "card".to_string(),
            is_active: true,
        });
        store.seed_partner_gateway("partner-a", 1, "sealed");
        store.seed_plans(vec![SubscriptionPlan::new("pro", 4)]);
        store
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let store = store();
        let service = SubscriptionService::builder(Arc::clone(&store), Arc::clone(&store), Arc::new(SlowDecryptor))
            .operation_timeout(Duration::from_millis(50))
            .build();

        let result = service
            .checkout(
                &MemberIdentity::new("m1", "partner-a"),
                &CheckoutRequest::new("pro").with_payment_gateway(1),
            )
            .await;
        assert!(matches!(result, Err(MemberflowError::Timeout(_))));
        assert!(store.get_all_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_from_config() {
        let store = store();
        let service = SubscriptionService::builder(Arc::clone(&store), Arc::clone(&store), Arc::new(SlowDecryptor))
            .config(EngineConfig::new().with_operation_timeout(Duration::from_secs(7)))
            .build();
        assert_eq!(service.timeout(), Some(Duration::from_secs(7)));

        let service = SubscriptionService::new(Arc::clone(&store), Arc::clone(&store), Arc::new(SlowDecryptor));
        assert_eq!(service.timeout(), None);
    }

    #[tokio::test]
    async fn test_audit_logger_shared_across_operations() {
        let store = store();
        let audit = RecordingAuditLogger::new();
        let service = SubscriptionService::builder(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::new(crate::subscriptions::payment::StaticPaymentDetails),
        )
        .clock(Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap())))
        .audit_logger(audit.clone())
        .build();

        let identity = MemberIdentity::new("m1", "partner-a");
        // "sealed" does not decrypt to payin: true
        let outcome = service
            .checkout(&identity, &CheckoutRequest::new("pro").with_payment_gateway(1))
            .await
            .unwrap();
        assert!(outcome.is_rejected());

        let page = service.list(&identity, &ListingQuery::default()).await.unwrap();
        assert_eq!(page.pagination.total, 0);

        let events = audit.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "operation_rejected");

        assert_eq!(service.plan("pro").await.unwrap().id, "pro");
    }
}
