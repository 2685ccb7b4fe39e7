//! Product migration processor.
//!
//! Moves one product from a member subscription to another of the same
//! member's subscriptions when the target plan is at least as large on every
//! capacity dimension.

use tracing::{info, instrument, warn};

use crate::error::Result;

use super::audit::{NoOpAuditLogger, SubscriptionAuditEvent, SubscriptionAuditLogger, record_rejection};
use super::eligibility::EligibilityValidator;
use super::error::SubscriptionError;
use super::payment::PaymentDetailsDecryptor;
use super::requests::ProductSwitchRequest;
use super::storage::{MembershipStore, PlanCatalog, ProductReassignment};
use super::types::{MemberIdentity, Product};
use super::validation::Outcome;

pub struct MigrationProcessor<S, P, D, A = NoOpAuditLogger>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    validator: EligibilityValidator<S, P, D>,
    audit: A,
}

impl<S, P, D> MigrationProcessor<S, P, D>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    pub fn new(validator: EligibilityValidator<S, P, D>) -> Self {
        Self {
            validator,
            audit: NoOpAuditLogger,
        }
    }
}

impl<S, P, D, A> MigrationProcessor<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger,
{
    pub fn with_audit_logger<B: SubscriptionAuditLogger>(self, audit: B) -> MigrationProcessor<S, P, D, B> {
        MigrationProcessor {
            validator: self.validator,
            audit,
        }
    }

    /// Validate and commit a product switch.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, product_id = %request.product_reference_id))]
    pub async fn migrate(
        &self,
        identity: &MemberIdentity,
        request: &ProductSwitchRequest,
    ) -> Result<Outcome<Product>> {
        let approved = match self.validator.validate_migration(identity, request).await? {
            Outcome::Accepted(approved) => approved,
            Outcome::Rejected(errors) => {
                record_rejection(&self.audit, &identity.member_id, "product_migration", &errors).await;
                return Ok(Outcome::Rejected(errors));
            }
        };

        let reassignment = ProductReassignment {
            product_id: approved.product.id.clone(),
            member_id: approved.product.member_id.clone(),
            from_subscription_id: approved.current.id.clone(),
            to_subscription_id: approved.target.id.clone(),
        };

        if !self.validator.store().reassign_product(&reassignment).await? {
            warn!(
                product_id = %reassignment.product_id,
                from = %reassignment.from_subscription_id,
                "product link changed before reassignment"
            );
            return Err(SubscriptionError::ConcurrentModification {
                subscription_id: reassignment.from_subscription_id,
            }
            .into());
        }

        info!(
            product_id = %reassignment.product_id,
            from_plan = %approved.current_plan.id,
            to_plan = %approved.target_plan.id,
            "product migrated"
        );

        self.audit
            .log(SubscriptionAuditEvent::ProductMigrated {
                member_id: reassignment.member_id.clone(),
                product_id: reassignment.product_id.clone(),
                from_subscription_id: reassignment.from_subscription_id.clone(),
                to_subscription_id: reassignment.to_subscription_id.clone(),
            })
            .await;

        Ok(Outcome::Accepted(Product {
            member_subscription_id: reassignment.to_subscription_id,
            ..approved.product
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemberflowError;
    use crate::subscriptions::clock::FixedClock;
    use crate::subscriptions::config::EngineConfig;
    use crate::subscriptions::payment::StaticPaymentDetails;
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use crate::subscriptions::types::{MemberSubscription, SubscriptionPlan, SubscriptionStatus};
    use crate::subscriptions::validation::{ReasonCode, fields};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    type Processor = MigrationProcessor<InMemoryMembershipStore, InMemoryMembershipStore, StaticPaymentDetails>;

    fn plan(id: &str, artists: u32, products: u32) -> SubscriptionPlan {
        let mut plan = SubscriptionPlan::new(id, 4);
        plan.artist_count = artists;
        plan.track_count = 100;
        plan.max_tracks_per_product = 20;
        plan.max_artists_per_product = 2;
        plan.product_count = products;
        plan
    }

    fn subscription(id: &str, plan_id: &str, status: SubscriptionStatus) -> MemberSubscription {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        MemberSubscription {
            id: id.to_string(),
            member_id: "m1".to_string(),
            plan_id: plan_id.to_string(),
            status,
            expiration_date: now + Duration::weeks(4),
            created_on: now,
            renewed_on: None,
            custom_name: None,
        }
    }

    fn setup() -> (Arc<InMemoryMembershipStore>, Processor) {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.seed_member("m1", "partner-a");
        store.seed_plans(vec![plan("small", 3, 5), plan("large", 5, 5), plan("full", 5, 0)]);
        store.seed_subscription(subscription("s-small", "small", SubscriptionStatus::Active));
        store.seed_subscription(subscription("s-large", "large", SubscriptionStatus::Active));
        store.seed_subscription(subscription("s-full", "full", SubscriptionStatus::Active));
        store.seed_product(Product {
            id: "p1".to_string(),
            member_id: "m1".to_string(),
            member_subscription_id: "s-small".to_string(),
            release_end_date: None,
        });
        store.seed_product(Product {
            id: "p2".to_string(),
            member_id: "m1".to_string(),
            member_subscription_id: "s-large".to_string(),
            release_end_date: None,
        });

        let validator = EligibilityValidator::new(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::new(StaticPaymentDetails),
            EngineConfig::default(),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 7, 2, 0, 0, 0).unwrap())),
        );
        (store, MigrationProcessor::new(validator))
    }

    fn identity() -> MemberIdentity {
        MemberIdentity::new("m1", "partner-a")
    }

    #[tokio::test]
    async fn test_upgrade_moves_product() {
        let (store, processor) = setup();
        let product = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-small", "s-large", "p1"))
            .await
            .unwrap()
            .accepted()
            .unwrap();
        assert_eq!(product.member_subscription_id, "s-large");
        assert_eq!(store.product("p1").unwrap().member_subscription_id, "s-large");
    }

    #[tokio::test]
    async fn test_downgrade_not_allowed() {
        let (store, processor) = setup();
        let errors = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-large", "s-small", "p2"))
            .await
            .unwrap()
            .rejected()
            .unwrap();
        assert_eq!(errors.get(fields::NEW_SUBSCRIPTION_ID), Some(&[ReasonCode::NotAllowed][..]));
        assert_eq!(store.product("p2").unwrap().member_subscription_id, "s-large");
    }

    #[tokio::test]
    async fn test_target_product_limit() {
        let (_, processor) = setup();
        let errors = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-small", "s-full", "p1"))
            .await
            .unwrap()
            .rejected()
            .unwrap();
        assert!(errors.contains(fields::NEW_SUBSCRIPTION_ID, ReasonCode::LimitExceeded));
    }

    #[tokio::test]
    async fn test_target_must_be_active() {
        let (store, processor) = setup();
        store.seed_subscription(subscription("s-large", "large", SubscriptionStatus::OnHold));
        let errors = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-small", "s-large", "p1"))
            .await
            .unwrap()
            .rejected()
            .unwrap();
        assert_eq!(errors.get(fields::NEW_SUBSCRIPTION_ID), Some(&[ReasonCode::NotActive][..]));
    }

    #[tokio::test]
    async fn test_same_plan_already_exists() {
        let (_, processor) = setup();
        let errors = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-small", "s-small", "p1"))
            .await
            .unwrap()
            .rejected()
            .unwrap();
        assert!(errors.contains(fields::NEW_SUBSCRIPTION_ID, ReasonCode::AlreadyExists));
    }

    #[tokio::test]
    async fn test_lost_race() {
        let (store, processor) = setup();
        store.set_stale_writes(true);
        let result = processor
            .migrate(&identity(), &ProductSwitchRequest::new("s-small", "s-large", "p1"))
            .await;
        assert!(matches!(result, Err(MemberflowError::ConcurrentModification(_))));
    }
}
