//! Eligibility checks run before every lifecycle mutation.
//!
//! Each `validate_*` method runs its operation's ordered battery and returns
//! either the data the processor needs to commit or the accumulated
//! [`ValidationErrors`]. Checks that need data from an earlier failed check
//! are skipped. A partner mismatch ends the battery immediately so nothing
//! about another partner's records is reported.
//!
//! Missing caller-supplied identifiers are validation failures. Store
//! inconsistencies, such as a subscription whose plan is gone, are errors.

use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{MemberflowError, Result};

use super::clock::SharedClock;
use super::config::EngineConfig;
use super::payment::{PaymentDetailsDecryptor, supports_payin};
use super::periods::PeriodCalculator;
use super::plans::PlanReader;
use super::requests::{CancellationRequest, CheckoutRequest, ProductSwitchRequest, RenewalRequest};
use super::storage::{MembershipStore, PlanCatalog};
use super::types::{
    Member, MemberIdentity, MemberSubscription, Product, SubscriptionPlan, SubscriptionStatus,
};
use super::validation::{
    Outcome, ReasonCode, ValidationErrors, fields, normalize_gateway_id, validate_custom_name,
};

/// Checkout inputs that passed validation.
#[derive(Debug, Clone)]
pub struct ApprovedCheckout {
    pub member: Member,
    pub plan: SubscriptionPlan,
    pub custom_name: Option<String>,
    /// Present for paid plans only.
    pub payment_gateway_id: Option<i64>,
}

/// Renewal inputs that passed validation.
#[derive(Debug, Clone)]
pub struct ApprovedRenewal {
    pub subscription: MemberSubscription,
    pub plan: SubscriptionPlan,
    pub payment_gateway_id: i64,
}

/// Cancellation inputs that passed validation.
#[derive(Debug, Clone)]
pub struct ApprovedCancellation {
    pub subscription: MemberSubscription,
    pub plan: SubscriptionPlan,
}

/// Product migration inputs that passed validation.
#[derive(Debug, Clone)]
pub struct ApprovedMigration {
    pub product: Product,
    pub current: MemberSubscription,
    pub current_plan: SubscriptionPlan,
    pub target: MemberSubscription,
    pub target_plan: SubscriptionPlan,
}

/// Whether an owned-subscription lookup also requires the plan to be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanRequirement {
    Active,
    Any,
}

/// Composes plan, subscription and identity state into accept/reject
/// decisions.
pub struct EligibilityValidator<S, P, D>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    store: Arc<S>,
    plans: PlanReader<P>,
    decryptor: Arc<D>,
    periods: PeriodCalculator,
    config: EngineConfig,
    clock: SharedClock,
}

impl<S, P, D> Clone for EligibilityValidator<S, P, D>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            plans: self.plans.clone(),
            decryptor: Arc::clone(&self.decryptor),
            periods: self.periods,
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, P, D> EligibilityValidator<S, P, D>
where
    S: MembershipStore,
    P: PlanCatalog,
    D: PaymentDetailsDecryptor,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<P>,
        decryptor: Arc<D>,
        config: EngineConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            plans: PlanReader::new(catalog),
            decryptor,
            periods: PeriodCalculator::from_config(&config),
            config,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn plans(&self) -> &PlanReader<P> {
        &self.plans
    }

    pub fn periods(&self) -> PeriodCalculator {
        self.periods
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Checkout battery: partner, custom name, plan, yearly limit, free plan
    /// exclusivity, payment gateway, one-time consumption.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, plan_id = %request.subscription_id))]
    pub async fn validate_checkout(
        &self,
        identity: &MemberIdentity,
        request: &CheckoutRequest,
    ) -> Result<Outcome<ApprovedCheckout>> {
        let mut errors = ValidationErrors::new();

        let Some(member) = self.check_member(identity, &mut errors).await? else {
            return Ok(Outcome::Rejected(errors));
        };

        let custom_name = validate_custom_name(
            request.custom_name.as_deref(),
            self.config.custom_name_max_length,
            &mut errors,
        );

        let plan = match self.plans.find(&request.subscription_id).await? {
            None => {
                errors.add(fields::SUBSCRIPTION_ID, ReasonCode::Invalid);
                None
            }
            Some(plan) if !plan.is_active => {
                errors.add(fields::SUBSCRIPTION_ID, ReasonCode::Inactive);
                None
            }
            Some(plan) if plan.duration == 0 => {
                errors.add(fields::SUBSCRIPTION_ID, ReasonCode::Invalid);
                None
            }
            Some(plan) => Some(plan),
        };

        let Some(plan) = plan else {
            return Ok(Outcome::Rejected(errors));
        };

        if let Some(limit) = plan.yearly_subscription_limit {
            let now = self.clock.now();
            let year_start = NaiveDate::from_ymd_opt(now.year(), 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
                .ok_or_else(|| MemberflowError::internal("could not compute start of year"))?;
            let count = self
                .store
                .count_plan_subscriptions_since(&member.id, &plan.id, year_start)
                .await?;
            if count >= u64::from(limit) {
                errors.add(fields::SUBSCRIPTION_ID, ReasonCode::LimitExceeded);
            }
        }

        let mut prior = None;
        if plan.is_free || plan.is_one_time {
            prior = Some(
                self.store
                    .find_member_plan_subscriptions(&member.id, &plan.id)
                    .await?,
            );
        }

        if plan.is_free
            && prior
                .as_deref()
                .is_some_and(|subs| subs.iter().any(|s| s.status.is_live()))
        {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::AlreadySubscribed);
        }

        let payment_gateway_id = if plan.is_free {
            None
        } else {
            self.check_gateway(&member.partner_id, request.payment_gateway_id, &mut errors)
                .await?
        };

        if plan.is_one_time && prior.as_deref().is_some_and(|subs| !subs.is_empty()) {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::AlreadyConsumed);
        }

        if errors.has_errors() {
            return Ok(Outcome::Rejected(errors));
        }

        Ok(Outcome::Accepted(ApprovedCheckout {
            member,
            plan,
            custom_name,
            payment_gateway_id,
        }))
    }

    /// Renewal battery: partner, subscription and plan, ownership, warning
    /// window, grace, status, free plan, payment gateway.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, subscription_id = %request.member_subscription_id))]
    pub async fn validate_renewal(
        &self,
        identity: &MemberIdentity,
        request: &RenewalRequest,
    ) -> Result<Outcome<ApprovedRenewal>> {
        let mut errors = ValidationErrors::new();

        let Some(member) = self.check_member(identity, &mut errors).await? else {
            return Ok(Outcome::Rejected(errors));
        };

        let Some((subscription, plan)) = self
            .load_owned(
                fields::SUBSCRIPTION_ID,
                &request.member_subscription_id,
                &member.id,
                PlanRequirement::Active,
                &mut errors,
            )
            .await?
        else {
            return Ok(Outcome::Rejected(errors));
        };

        let now = self.clock.now();
        let expiration = subscription.expiration_date;

        // Renewal stays closed while the warning window is open.
        if self.periods.is_in_warning(expiration, plan.duration, now) {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::InWarning);
        }
        if self.periods.is_past_grace(expiration, plan.renewable_within, now) {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::Expired);
        }
        if !subscription.status.is_renewable() {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::InvalidStatus);
        }
        if plan.is_free {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::FreePlan);
        }

        let gateway = self
            .check_gateway(&member.partner_id, request.payment_gateway_id, &mut errors)
            .await?;

        match gateway {
            Some(payment_gateway_id) if !errors.has_errors() => {
                Ok(Outcome::Accepted(ApprovedRenewal {
                    subscription,
                    plan,
                    payment_gateway_id,
                }))
            }
            _ => Ok(Outcome::Rejected(errors)),
        }
    }

    /// Cancellation battery: partner, subscription, ownership, cancellation
    /// policy, status, live products.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, subscription_id = %request.member_subscription_id))]
    pub async fn validate_cancellation(
        &self,
        identity: &MemberIdentity,
        request: &CancellationRequest,
    ) -> Result<Outcome<ApprovedCancellation>> {
        let mut errors = ValidationErrors::new();

        let Some(member) = self.check_member(identity, &mut errors).await? else {
            return Ok(Outcome::Rejected(errors));
        };

        let Some((subscription, plan)) = self
            .load_owned(
                fields::SUBSCRIPTION_ID,
                &request.member_subscription_id,
                &member.id,
                PlanRequirement::Any,
                &mut errors,
            )
            .await?
        else {
            return Ok(Outcome::Rejected(errors));
        };

        if !plan.is_cancellation_enabled {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::NotEnabled);
        }
        if !subscription.status.is_cancellable() {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::InvalidStatus);
        }

        let today = self.clock.today();
        let products = self.store.list_subscription_products(&subscription.id).await?;
        if products.iter().any(|p| p.is_live_on(today)) {
            errors.add(fields::SUBSCRIPTION_ID, ReasonCode::LiveProducts);
        }

        if errors.has_errors() {
            return Ok(Outcome::Rejected(errors));
        }

        Ok(Outcome::Accepted(ApprovedCancellation { subscription, plan }))
    }

    /// Migration battery: member and partner, both subscriptions, product
    /// link, duplicate placement, target product limit, target status,
    /// capacity comparison.
    #[instrument(skip(self, request), fields(member_id = %identity.member_id, product_id = %request.product_reference_id))]
    pub async fn validate_migration(
        &self,
        identity: &MemberIdentity,
        request: &ProductSwitchRequest,
    ) -> Result<Outcome<ApprovedMigration>> {
        let mut errors = ValidationErrors::new();

        let Some(member) = self.check_member(identity, &mut errors).await? else {
            return Ok(Outcome::Rejected(errors));
        };

        let current = self
            .load_owned(
                fields::CURRENT_SUBSCRIPTION_ID,
                &request.current_subscription_id,
                &member.id,
                PlanRequirement::Any,
                &mut errors,
            )
            .await?;
        let target = self
            .load_owned(
                fields::NEW_SUBSCRIPTION_ID,
                &request.new_subscription_id,
                &member.id,
                PlanRequirement::Any,
                &mut errors,
            )
            .await?;

        let product = match self.store.get_product(&request.product_reference_id).await? {
            Some(product)
                if product.member_id == member.id
                    && product.member_subscription_id == request.current_subscription_id =>
            {
                Some(product)
            }
            _ => {
                errors.add(fields::PRODUCT_REFERENCE_ID, ReasonCode::Invalid);
                None
            }
        };

        let (Some((current, current_plan)), Some((target, target_plan)), Some(product)) =
            (current, target, product)
        else {
            return Ok(Outcome::Rejected(errors));
        };

        let placed_on_target_plan = self
            .store
            .find_member_plan_subscriptions(&member.id, &target_plan.id)
            .await?
            .iter()
            .any(|s| s.id == product.member_subscription_id);
        if placed_on_target_plan {
            errors.add(fields::NEW_SUBSCRIPTION_ID, ReasonCode::AlreadyExists);
        }

        let on_target = self.store.count_subscription_products(&target.id).await?;
        if on_target >= u64::from(target_plan.product_count) {
            errors.add(fields::NEW_SUBSCRIPTION_ID, ReasonCode::LimitExceeded);
        }

        if target.status != SubscriptionStatus::Active || !target_plan.is_active {
            errors.add(fields::NEW_SUBSCRIPTION_ID, ReasonCode::NotActive);
        }

        let shortfalls = target_plan.capacity().shortfalls(&current_plan.capacity());
        if !shortfalls.is_empty() {
            debug!(?shortfalls, target_plan = %target_plan.id, "target plan is smaller");
            errors.add(fields::NEW_SUBSCRIPTION_ID, ReasonCode::NotAllowed);
        }

        if errors.has_errors() {
            return Ok(Outcome::Rejected(errors));
        }

        Ok(Outcome::Accepted(ApprovedMigration {
            product,
            current,
            current_plan,
            target,
            target_plan,
        }))
    }

    /// Load the caller's member record and confirm the partner matches.
    async fn check_member(
        &self,
        identity: &MemberIdentity,
        errors: &mut ValidationErrors,
    ) -> Result<Option<Member>> {
        match self.store.get_member(&identity.member_id).await? {
            None => {
                errors.add(fields::MEMBER_ID, ReasonCode::Invalid);
                Ok(None)
            }
            Some(member) if member.partner_id != identity.partner_id => {
                debug!(
                    member_id = %member.id,
                    "caller partner does not match the member's partner"
                );
                errors.add(fields::PARTNER_ID, ReasonCode::AuthFailed);
                Ok(None)
            }
            Some(member) => Ok(Some(member)),
        }
    }

    /// Load a subscription and its plan, recording failures under `field`.
    async fn load_owned(
        &self,
        field: &str,
        subscription_id: &str,
        member_id: &str,
        requirement: PlanRequirement,
        errors: &mut ValidationErrors,
    ) -> Result<Option<(MemberSubscription, SubscriptionPlan)>> {
        let Some(subscription) = self.store.get_subscription(subscription_id).await? else {
            errors.add(field, ReasonCode::Invalid);
            return Ok(None);
        };

        let plan = self.plans.plan_of(&subscription).await?;

        let mut ok = true;
        if requirement == PlanRequirement::Active && !plan.is_active {
            errors.add(field, ReasonCode::Inactive);
            ok = false;
        }
        if subscription.member_id != member_id {
            errors.add(field, ReasonCode::Invalid);
            ok = false;
        }

        Ok(ok.then_some((subscription, plan)))
    }

    /// Gateway chain: required, exists and active, endorsed by the partner,
    /// decrypted details allow pay-ins. Returns the gateway ID when every
    /// step passes.
    async fn check_gateway(
        &self,
        partner_id: &str,
        gateway_id: Option<i64>,
        errors: &mut ValidationErrors,
    ) -> Result<Option<i64>> {
        let Some(gateway_id) = normalize_gateway_id(gateway_id) else {
            errors.add(fields::PAYMENT_GATEWAY_ID, ReasonCode::Required);
            return Ok(None);
        };

        match self.store.get_payment_gateway(gateway_id).await? {
            Some(gateway) if gateway.is_active => {}
            _ => {
                errors.add(fields::PAYMENT_GATEWAY_ID, ReasonCode::Invalid);
                return Ok(None);
            }
        }

        let Some(endorsement) = self.store.get_partner_gateway(partner_id, gateway_id).await? else {
            errors.add(fields::PAYMENT_GATEWAY_ID, ReasonCode::NotEndorsed);
            return Ok(None);
        };

        // Stored details are not caller input; an unreadable blob is a store fault.
        let details = self
            .decryptor
            .decrypt(&endorsement.payment_details)
            .await
            .map_err(|err| {
                if err.is_server_error() {
                    err
                } else {
                    MemberflowError::internal(format!(
                        "payment details for gateway {} unreadable: {}",
                        gateway_id, err
                    ))
                }
            })?;
        if !supports_payin(&details) {
            errors.add(fields::PAYMENT_GATEWAY_ID, ReasonCode::PayinNotSupported);
            return Ok(None);
        }

        Ok(Some(gateway_id))
    }
}
