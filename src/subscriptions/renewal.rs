//! Renewal processor.

use tracing::{info, instrument, warn};

use crate::error::Result;

use super::audit::{NoOpAuditLogger, SubscriptionAuditEvent, SubscriptionAuditLogger, record_rejection};
use super::eligibility::EligibilityValidator;
use super::error::SubscriptionError;
use super::payment::PaymentDetailsDecryptor;
use super::requests::RenewalRequest;
use super::storage::{MembershipStore, PlanCatalog, RenewalUpdate};
use super::types::{MemberIdentity, MemberSubscription, SubscriptionStatus};
use super::validation::Outcome;

/// Extends subscription expirations.
pub struct RenewalProcessor<S, P, D, A = NoOpAuditLogger>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    validator: EligibilityValidator<S, P, D>,
    audit: A,
}

impl<S, P, D> RenewalProcessor<S, P, D>
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

impl<S, P, D, A> RenewalProcessor<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger,
{
    pub fn with_audit_logger<B: SubscriptionAuditLogger>(self, audit: B) -> RenewalProcessor<S, P, D, B> {
        RenewalProcessor {
            validator: self.validator,
            audit,
        }
    }

    /// Validate and commit a renewal.
    ///
    /// The new expiration is the grace end when renewing inside the grace
    /// window, otherwise one term from now, and never earlier than the
    /// current expiration.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` when the subscription changed between
    /// validation and the write.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, subscription_id = %request.member_subscription_id))]
    pub async fn renew(
        &self,
        identity: &MemberIdentity,
        request: &RenewalRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        let approved = match self.validator.validate_renewal(identity, request).await? {
            Outcome::Accepted(approved) => approved,
            Outcome::Rejected(errors) => {
                record_rejection(&self.audit, &identity.member_id, "renewal", &errors).await;
                return Ok(Outcome::Rejected(errors));
            }
        };

        let clock = self.validator.clock();
        let now = clock.now();
        let current = approved.subscription;

        let update = RenewalUpdate {
            subscription_id: current.id.clone(),
            observed_status: current.status,
            observed_expiration: current.expiration_date,
            new_expiration: self
                .validator
                .periods()
                .renewal_expiration(current.expiration_date, &approved.plan, now),
            renewed_on: clock.today(),
        };

        if !self.validator.store().renew_subscription(&update).await? {
            warn!(
                subscription_id = %current.id,
                observed_status = %current.status,
                "renewal guard matched no rows"
            );
            return Err(SubscriptionError::ConcurrentModification {
                subscription_id: current.id,
            }
            .into());
        }

        info!(
            subscription_id = %current.id,
            previous_expiration = %current.expiration_date,
            new_expiration = %update.new_expiration,
            payment_gateway_id = approved.payment_gateway_id,
            "subscription renewed"
        );

        self.audit
            .log(SubscriptionAuditEvent::SubscriptionRenewed {
                member_id: current.member_id.clone(),
                subscription_id: current.id.clone(),
                previous_status: current.status,
                previous_expiration: current.expiration_date,
                new_expiration: update.new_expiration,
                payment_gateway_id: approved.payment_gateway_id,
            })
            .await;

        Ok(Outcome::Accepted(MemberSubscription {
            status: SubscriptionStatus::Active,
            expiration_date: update.new_expiration,
            renewed_on: Some(update.renewed_on),
            ..current
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemberflowError;
    use crate::subscriptions::audit::RecordingAuditLogger;
    use crate::subscriptions::clock::FixedClock;
    use crate::subscriptions::config::{EngineConfig, GraceBoundary, PeriodUnit};
    use crate::subscriptions::payment::StaticPaymentDetails;
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use crate::subscriptions::types::{PaymentGateway, SubscriptionPlan};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()
    }

    fn setup(
        boundary: GraceBoundary,
    ) -> (
        Arc<InMemoryMembershipStore>,
        FixedClock,
        RenewalProcessor<InMemoryMembershipStore, InMemoryMembershipStore, StaticPaymentDetails>,
    ) {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.seed_member("m1", "partner-a");
        store.seed_gateway(PaymentGateway {
            id: 1,
            name: "card".to_string(),
            is_active: true,
        });
        store.seed_partner_gateway("partner-a", 1, r#"{"payin": true}"#);

        let mut plan = SubscriptionPlan::new("monthly", 30);
        plan.renewable_within = 10;
        store.seed_plans(vec![plan]);
        store.seed_subscription(MemberSubscription {
            id: "s1".to_string(),
            member_id: "m1".to_string(),
            plan_id: "monthly".to_string(),
            status: SubscriptionStatus::OnHold,
            expiration_date: start() + Duration::days(30),
            created_on: start(),
            renewed_on: None,
            custom_name: None,
        });

        let clock = FixedClock::new(start());
        let validator = EligibilityValidator::new(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::new(StaticPaymentDetails),
            EngineConfig::new()
                .with_period_unit(PeriodUnit::Days)
                .with_grace_boundary(boundary),
            Arc::new(clock.clone()),
        );
        (store, clock, RenewalProcessor::new(validator))
    }

    fn identity() -> MemberIdentity {
        MemberIdentity::new("m1", "partner-a")
    }

    #[tokio::test]
    async fn test_renewal_in_grace_window() {
        let (store, clock, processor) = setup(GraceBoundary::Window);
        clock.set(start() + Duration::days(32));

        let renewed = processor
            .renew(&identity(), &RenewalRequest::new("s1", 1))
            .await
            .unwrap()
            .accepted()
            .unwrap();
        assert_eq!(renewed.expiration_date, start() + Duration::days(40));
        assert_eq!(renewed.status, SubscriptionStatus::Active);
        assert_eq!(renewed.renewed_on, Some((start() + Duration::days(32)).date_naive()));

        let stored = store.get_subscription("s1").await.unwrap().unwrap();
        assert_eq!(stored, renewed);
    }

    #[tokio::test]
    async fn test_renewal_audit_records_gateway() {
        let (_, clock, processor) = setup(GraceBoundary::Window);
        let audit = RecordingAuditLogger::new();
        let processor = processor.with_audit_logger(audit.clone());
        clock.set(start() + Duration::days(32));

        processor
            .renew(&identity(), &RenewalRequest::new("s1", 1))
            .await
            .unwrap()
            .accepted()
            .unwrap();

        let events = audit.events().await;
        assert!(matches!(
            events.as_slice(),
            [SubscriptionAuditEvent::SubscriptionRenewed { payment_gateway_id: 1, .. }]
        ));
        assert!(events[0].to_string().ends_with("gateway=1"));
    }

    #[tokio::test]
    async fn test_literal_boundary_renews_from_now() {
        let (_, clock, processor) = setup(GraceBoundary::Literal);
        clock.set(start() + Duration::days(32));

        let renewed = processor
            .renew(&identity(), &RenewalRequest::new("s1", 1))
            .await
            .unwrap()
            .accepted()
            .unwrap();
        assert_eq!(renewed.expiration_date, start() + Duration::days(62));
    }

    #[tokio::test]
    async fn test_renewal_before_expiry_never_shortens() {
        let (_, clock, processor) = setup(GraceBoundary::Window);
        // past the warning window, which closes at day 0, and before expiration
        clock.set(start() + Duration::days(1));

        let renewed = processor
            .renew(&identity(), &RenewalRequest::new("s1", 1))
            .await
            .unwrap()
            .accepted()
            .unwrap();
        assert_eq!(renewed.expiration_date, start() + Duration::days(31));
        assert!(renewed.expiration_date >= start() + Duration::days(30));
    }

    #[tokio::test]
    async fn test_lost_race_is_concurrent_modification() {
        let (store, clock, processor) = setup(GraceBoundary::Window);
        clock.set(start() + Duration::days(32));
        store.set_stale_writes(true);

        let result = processor.renew(&identity(), &RenewalRequest::new("s1", 1)).await;
        assert!(matches!(result, Err(MemberflowError::ConcurrentModification(_))));

        let stored = store.get_subscription("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::OnHold);
    }
}
