//! Checkout processor.
//!
//! Creates a member subscription and, for paid plans, the payout gateway
//! link, in one store transaction.

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::Result;

use super::audit::{NoOpAuditLogger, SubscriptionAuditEvent, SubscriptionAuditLogger, record_rejection};
use super::eligibility::{ApprovedCheckout, EligibilityValidator};
use super::payment::PaymentDetailsDecryptor;
use super::requests::CheckoutRequest;
use super::storage::{MembershipStore, PlanCatalog};
use super::types::{MemberIdentity, MemberSubscription, PayoutGatewayLink, SubscriptionStatus};
use super::validation::Outcome;

/// Opens new subscriptions.
pub struct CheckoutProcessor<S, P, D, A = NoOpAuditLogger>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    validator: EligibilityValidator<S, P, D>,
    audit: A,
}

impl<S, P, D> CheckoutProcessor<S, P, D>
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

impl<S, P, D, A> CheckoutProcessor<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger,
{
    /// Replace the audit logger.
    pub fn with_audit_logger<B: SubscriptionAuditLogger>(self, audit: B) -> CheckoutProcessor<S, P, D, B> {
        CheckoutProcessor {
            validator: self.validator,
            audit,
        }
    }

    /// Validate and commit a checkout.
    ///
    /// Returns the created subscription, or the validation failures with
    /// nothing written.
    ///
    /// # Errors
    ///
    /// `Internal("insertion failed")` when the insert affects no rows, plus
    /// any store or decryption failure.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, plan_id = %request.subscription_id))]
    pub async fn checkout(
        &self,
        identity: &MemberIdentity,
        request: &CheckoutRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        let approved = match self.validator.validate_checkout(identity, request).await? {
            Outcome::Accepted(approved) => approved,
            Outcome::Rejected(errors) => {
                record_rejection(&self.audit, &identity.member_id, "checkout", &errors).await;
                return Ok(Outcome::Rejected(errors));
            }
        };

        let (subscription, payout_link) = self.build(approved);

        self.validator
            .store()
            .create_subscription(&subscription, payout_link.as_ref())
            .await
            .inspect_err(|e| {
                error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "checkout transaction failed"
                );
            })?;

        info!(
            subscription_id = %subscription.id,
            expiration_date = %subscription.expiration_date,
            payout_linked = payout_link.is_some(),
            "subscription created"
        );

        self.audit
            .log(SubscriptionAuditEvent::CheckoutCompleted {
                member_id: subscription.member_id.clone(),
                subscription_id: subscription.id.clone(),
                plan_id: subscription.plan_id.clone(),
                expiration_date: subscription.expiration_date,
                payout_linked: payout_link.is_some(),
            })
            .await;

        Ok(Outcome::Accepted(subscription))
    }

    fn build(&self, approved: ApprovedCheckout) -> (MemberSubscription, Option<PayoutGatewayLink>) {
        let now = self.validator.clock().now();
        let plan = approved.plan;

        let subscription = MemberSubscription {
            id: Uuid::new_v4().to_string(),
            member_id: approved.member.id,
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Active,
            expiration_date: self.validator.periods().term_end(now, plan.duration),
            created_on: now,
            renewed_on: None,
            custom_name: approved.custom_name,
        };

        let payout_link = match (plan.is_free, approved.payment_gateway_id) {
            (false, Some(gateway_id)) => {
                Some(PayoutGatewayLink::for_plan(&subscription.member_id, gateway_id, &plan))
            }
            _ => None,
        };

        (subscription, payout_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemberflowError;
    use crate::subscriptions::audit::RecordingAuditLogger;
    use crate::subscriptions::clock::FixedClock;
    use crate::subscriptions::config::{EngineConfig, PeriodUnit};
    use crate::subscriptions::payment::StaticPaymentDetails;
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use crate::subscriptions::types::{PaymentGateway, SubscriptionPlan};
    use crate::subscriptions::validation::{ReasonCode, fields};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn setup() -> (
        Arc<InMemoryMembershipStore>,
        CheckoutProcessor<InMemoryMembershipStore, InMemoryMembershipStore, StaticPaymentDetails, RecordingAuditLogger>,
        RecordingAuditLogger,
    ) {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.seed_member("m1", "partner-a");
        store.seed_gateway(PaymentGateway {
            id: 1,
            name: "card".to_string(),
            is_active: true,
        });
        store.seed_partner_gateway("partner-a", 1, r#"{"payin": true}"#);

        let mut pro = SubscriptionPlan::new("pro", 4);
        pro.amount = 999;
        pro.tax = 200;
        let mut free = SubscriptionPlan::new("free", 4);
        free.is_free = true;
        store.seed_plans(vec![pro, free]);

        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()));
        let validator = EligibilityValidator::new(
            Arc::clone(&store),
            Arc::clone(&store),
            Arc::new(StaticPaymentDetails),
            EngineConfig::new().with_period_unit(PeriodUnit::Weeks),
            clock,
        );
        let audit = RecordingAuditLogger::new();
        let processor = CheckoutProcessor::new(validator).with_audit_logger(audit.clone());
        (store, processor, audit)
    }

    fn identity() -> MemberIdentity {
        MemberIdentity::new("m1", "partner-a")
    }

    #[tokio::test]
    async fn test_paid_checkout_creates_link() {
        let (store, processor, audit) = setup();
        let request = CheckoutRequest::new("pro").with_payment_gateway(1);

        let sub = processor.checkout(&identity(), &request).await.unwrap().accepted().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expiration_date, sub.created_on + Duration::weeks(4));

        let links = store.get_payout_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].payment_details["amount"], 999);
        assert_eq!(store.get_all_subscriptions(), vec![sub]);

        let events = audit.events().await;
        assert!(matches!(
            events.as_slice(),
            [SubscriptionAuditEvent::CheckoutCompleted { payout_linked: true, .. }]
        ));
    }

    #[tokio::test]
    async fn test_free_checkout_has_no_link() {
        let (store, processor, _) = setup();
        let sub = processor
            .checkout(&identity(), &CheckoutRequest::new("free").with_payment_gateway(1))
            .await
            .unwrap()
            .accepted()
            .unwrap();
        assert_eq!(sub.plan_id, "free");
        assert!(store.get_payout_links().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_writes_nothing() {
        let (store, processor, audit) = setup();
        let errors = processor
            .checkout(&identity(), &CheckoutRequest::new("pro"))
            .await
            .unwrap()
            .rejected()
            .unwrap();
        assert!(errors.contains(fields::PAYMENT_GATEWAY_ID, ReasonCode::Required));
        assert!(store.get_all_subscriptions().is_empty());
        assert_eq!(audit.events().await[0].kind(), "operation_rejected");
    }

    #[tokio::test]
    async fn test_insertion_failure_is_internal() {
        let (store, processor, audit) = setup();
        store.set_fail_inserts(true);
        let result = processor
            .checkout(&identity(), &CheckoutRequest::new("pro").with_payment_gateway(1))
            .await;
        assert!(matches!(result, Err(MemberflowError::Internal(ref m)) if m.contains("insertion failed")));
        assert!(store.get_payout_links().is_empty());
        assert!(audit.events().await.is_empty());
    }
}
