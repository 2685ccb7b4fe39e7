//! Cancellation processor.

use tracing::{info, instrument, warn};

use crate::error::Result;

use super::audit::{NoOpAuditLogger, SubscriptionAuditEvent, SubscriptionAuditLogger, record_rejection};
use super::eligibility::EligibilityValidator;
use super::error::SubscriptionError;
use super::payment::PaymentDetailsDecryptor;
use super::requests::CancellationRequest;
use super::storage::{MembershipStore, PlanCatalog, StatusUpdate};
use super::types::{MemberIdentity, MemberSubscription, SubscriptionStatus};
use super::validation::Outcome;

/// Moves subscriptions to the terminal cancelled status.
pub struct CancellationProcessor<S, P, D, A = NoOpAuditLogger>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    validator: EligibilityValidator<S, P, D>,
    audit: A,
}

impl<S, P, D> CancellationProcessor<S, P, D>
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

impl<S, P, D, A> CancellationProcessor<S, P, D, A>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
    A: SubscriptionAuditLogger,
{
    pub fn with_audit_logger<B: SubscriptionAuditLogger>(self, audit: B) -> CancellationProcessor<S, P, D, B> {
        CancellationProcessor {
            validator: self.validator,
            audit,
        }
    }

    /// Validate and commit a cancellation.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, subscription_id = %request.member_subscription_id))]
    pub async fn cancel(
        &self,
        identity: &MemberIdentity,
        request: &CancellationRequest,
    ) -> Result<Outcome<MemberSubscription>> {
        let approved = match self.validator.validate_cancellation(identity, request).await? {
            Outcome::Accepted(approved) => approved,
            Outcome::Rejected(errors) => {
                record_rejection(&self.audit, &identity.member_id, "cancellation", &errors).await;
                return Ok(Outcome::Rejected(errors));
            }
        };

        let subscription = approved.subscription;
        let update = StatusUpdate {
            subscription_id: subscription.id.clone(),
            observed_status: subscription.status,
            new_status: SubscriptionStatus::Cancelled,
        };

        if !self.validator.store().update_subscription_status(&update).await? {
            warn!(
                subscription_id = %subscription.id,
                observed_status = %subscription.status,
                "cancellation guard matched no rows"
            );
            return Err(SubscriptionError::ConcurrentModification {
                subscription_id: subscription.id,
            }
            .into());
        }

        info!(subscription_id = %subscription.id, "subscription cancelled");

        self.audit
            .log(SubscriptionAuditEvent::SubscriptionCancelled {
                member_id: subscription.member_id.clone(),
                subscription_id: subscription.id.clone(),
                previous_status: subscription.status,
            })
            .await;

        Ok(Outcome::Accepted(MemberSubscription {
            status: SubscriptionStatus::Cancelled,
            ..subscription
        }))
    }
}
