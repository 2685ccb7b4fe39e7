//! Storage traits for membership data.
//!
//! Implement these traits to back the processors with a database. Reads are
//! plain lookups; each write method is one atomic unit and every update is
//! guarded by the state the caller observed during validation.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
    Member, MemberSubscription, PartnerGateway, PaymentGateway, PayoutGatewayLink, Product,
    SubscriptionPlan, SubscriptionStatus,
};

/// Read-only access to the plan catalog.
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Get a plan by ID.
    async fn get_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>>;

    /// List every plan, active or not.
    async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>>;

    /// Get several plans at once. Unknown IDs are skipped.
    async fn get_plans(&self, plan_ids: &[String]) -> Result<Vec<SubscriptionPlan>> {
        let mut plans = Vec::with_capacity(plan_ids.len());
        for id in plan_ids {
            if let Some(plan) = self.get_plan(id).await? {
                plans.push(plan);
            }
        }
        Ok(plans)
    }
}

/// Renewal write: set a new expiration, mark active and stamp `renewed_on`.
///
/// Applies only while the stored row still has `observed_status` and
/// `observed_expiration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalUpdate {
    pub subscription_id: String,
    pub observed_status: SubscriptionStatus,
    pub observed_expiration: DateTime<Utc>,
    pub new_expiration: DateTime<Utc>,
    pub renewed_on: NaiveDate,
}

/// Status write guarded by the observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub subscription_id: String,
    pub observed_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
}

/// Move a product between subscriptions, guarded by its observed link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReassignment {
    pub product_id: String,
    pub member_id: String,
    pub from_subscription_id: String,
    pub to_subscription_id: String,
}

/// Trait for storing membership data.
///
/// An in-memory implementation is provided for testing.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    // Identity and gateways

    async fn get_member(&self, member_id: &str) -> Result<Option<Member>>;

    async fn get_payment_gateway(&self, gateway_id: i64) -> Result<Option<PaymentGateway>>;

    /// The partner's endorsement of a gateway, if it exists.
    async fn get_partner_gateway(
        &self,
        partner_id: &str,
        gateway_id: i64,
    ) -> Result<Option<PartnerGateway>>;

    // Subscriptions

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<MemberSubscription>>;

    /// All subscriptions held by a member, in any status.
    async fn list_member_subscriptions(&self, member_id: &str) -> Result<Vec<MemberSubscription>>;

    /// Subscriptions the member opened on `plan_id` at or after `since`.
    async fn count_plan_subscriptions_since(
        &self,
        member_id: &str,
        plan_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// All of the member's subscriptions on `plan_id`, in any status.
    async fn find_member_plan_subscriptions(
        &self,
        member_id: &str,
        plan_id: &str,
    ) -> Result<Vec<MemberSubscription>>;

    // Products

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>>;

    async fn list_subscription_products(&self, subscription_id: &str) -> Result<Vec<Product>>;

    async fn count_subscription_products(&self, subscription_id: &str) -> Result<u64>;

    // Writes

    /// Insert a subscription and, when given, its payout link in one
    /// transaction.
    ///
    /// An insert that affects no rows must fail with
    /// [`SubscriptionError::InsertionFailed`](super::SubscriptionError) and
    /// leave nothing behind.
    async fn create_subscription(
        &self,
        subscription: &MemberSubscription,
        payout_link: Option<&PayoutGatewayLink>,
    ) -> Result<()>;

    /// Apply a renewal.
    ///
    /// Returns `Ok(true)` if the row matched, `Ok(false)` if the observed
    /// state no longer holds.
    async fn renew_subscription(&self, update: &RenewalUpdate) -> Result<bool>;

    /// Apply a status change. Same return contract as `renew_subscription`.
    async fn update_subscription_status(&self, update: &StatusUpdate) -> Result<bool>;

    /// Reassign a product. Same return contract as `renew_subscription`.
    async fn reassign_product(&self, reassignment: &ProductReassignment) -> Result<bool>;
}

#[cfg(any(test, feature = "test-membership"))]
pub mod test {
    use super::*;
    use crate::subscriptions::error::SubscriptionError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, RwLock};

    /// In-memory membership store and plan catalog for testing.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemoryMembershipStore {
        inner: Arc<InMemoryMembershipStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryMembershipStoreInner {
        plans: RwLock<HashMap<String, SubscriptionPlan>>,
        members: RwLock<HashMap<String, Member>>,
        gateways: RwLock<HashMap<i64, PaymentGateway>>,
        partner_gateways: RwLock<HashMap<(String, i64), PartnerGateway>>,
        subscriptions: RwLock<HashMap<String, MemberSubscription>>,
        products: RwLock<HashMap<String, Product>>,
        payout_links: RwLock<Vec<PayoutGatewayLink>>,
        fail_inserts: AtomicBool,
        stale_writes: AtomicBool,
    }

    impl InMemoryMembershipStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed_plans(&self, plans: Vec<SubscriptionPlan>) {
            let mut store = self.inner.plans.write().unwrap();
            for plan in plans {
                store.insert(plan.id.clone(), plan);
            }
        }

        pub fn seed_member(&self, member_id: &str, partner_id: &str) {
            self.inner.members.write().unwrap().insert(
                member_id.to_string(),
                Member {
                    id: member_id.to_string(),
                    partner_id: partner_id.to_string(),
                },
            );
        }

        pub fn seed_gateway(&self, gateway: PaymentGateway) {
            self.inner.gateways.write().unwrap().insert(gateway.id, gateway);
        }

        /// Endorse `gateway_id` for `partner_id` with the given details blob.
        pub fn seed_partner_gateway(&self, partner_id: &str, gateway_id: i64, payment_details: &str) {
            self.inner.partner_gateways.write().unwrap().insert(
                (partner_id.to_string(), gateway_id),
                PartnerGateway {
                    partner_id: partner_id.to_string(),
                    payment_gateway_id: gateway_id,
                    payment_details: payment_details.to_string(),
                },
            );
        }

        pub fn seed_subscription(&self, subscription: MemberSubscription) {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .insert(subscription.id.clone(), subscription);
        }

        pub fn seed_product(&self, product: Product) {
            self.inner.products.write().unwrap().insert(product.id.clone(), product);
        }

        /// Make subscription inserts report zero affected rows.
        pub fn set_fail_inserts(&self, fail: bool) {
            self.inner.fail_inserts.store(fail, Ordering::SeqCst);
        }

        /// Make every guarded update miss, as if another writer got there first.
        pub fn set_stale_writes(&self, stale: bool) {
            self.inner.stale_writes.store(stale, Ordering::SeqCst);
        }

        /// Get all subscriptions (for testing).
        pub fn get_all_subscriptions(&self) -> Vec<MemberSubscription> {
            let mut subs: Vec<_> = self.inner.subscriptions.read().unwrap().values().cloned().collect();
            subs.sort_by(|a, b| a.created_on.cmp(&b.created_on).then_with(|| a.id.cmp(&b.id)));
            subs
        }

        /// Get all payout links (for testing).
        pub fn get_payout_links(&self) -> Vec<PayoutGatewayLink> {
            self.inner.payout_links.read().unwrap().clone()
        }

        /// Get a product as currently stored (for testing).
        pub fn product(&self, product_id: &str) -> Option<Product> {
            self.inner.products.read().unwrap().get(product_id).cloned()
        }

        fn stale(&self) -> bool {
            self.inner.stale_writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlanCatalog for InMemoryMembershipStore {
        async fn get_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>> {
            Ok(self.inner.plans.read().unwrap().get(plan_id).cloned())
        }

        async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>> {
            let mut plans: Vec<_> = self.inner.plans.read().unwrap().values().cloned().collect();
            plans.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(plans)
        }
    }

    #[async_trait]
    impl MembershipStore for InMemoryMembershipStore {
        async fn get_member(&self, member_id: &str) -> Result<Option<Member>> {
            Ok(self.inner.members.read().unwrap().get(member_id).cloned())
        }

        async fn get_payment_gateway(&self, gateway_id: i64) -> Result<Option<PaymentGateway>> {
            Ok(self.inner.gateways.read().unwrap().get(&gateway_id).cloned())
        }

        async fn get_partner_gateway(
            &self,
            partner_id: &str,
            gateway_id: i64,
        ) -> Result<Option<PartnerGateway>> {
            Ok(self
                .inner
                .partner_gateways
                .read()
                .unwrap()
                .get(&(partner_id.to_string(), gateway_id))
                .cloned())
        }

        async fn get_subscription(&self, subscription_id: &str) -> Result<Option<MemberSubscription>> {
            Ok(self.inner.subscriptions.read().unwrap().get(subscription_id).cloned())
        }

        async fn list_member_subscriptions(&self, member_id: &str) -> Result<Vec<MemberSubscription>> {
            Ok(self
                .get_all_subscriptions()
                .into_iter()
                .filter(|s| s.member_id == member_id)
                .collect())
        }

        async fn count_plan_subscriptions_since(
            &self,
            member_id: &str,
            plan_id: &str,
            since: DateTime<Utc>,
        ) -> Result<u64> {
            let subs = self.inner.subscriptions.read().unwrap();
            Ok(subs
                .values()
                .filter(|s| s.member_id == member_id && s.plan_id == plan_id && s.created_on >= since)
                .count() as u64)
        }

        async fn find_member_plan_subscriptions(
            &self,
            member_id: &str,
            plan_id: &str,
        ) -> Result<Vec<MemberSubscription>> {
            Ok(self
                .get_all_subscriptions()
                .into_iter()
                .filter(|s| s.member_id == member_id && s.plan_id == plan_id)
                .collect())
        }

        async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
            Ok(self.product(product_id))
        }

        async fn list_subscription_products(&self, subscription_id: &str) -> Result<Vec<Product>> {
            let mut products: Vec<_> = self
                .inner
                .products
                .read()
                .unwrap()
                .values()
                .filter(|p| p.member_subscription_id == subscription_id)
                .cloned()
                .collect();
            products.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(products)
        }

        async fn count_subscription_products(&self, subscription_id: &str) -> Result<u64> {
            Ok(self.list_subscription_products(subscription_id).await?.len() as u64)
        }

        async fn create_subscription(
            &self,
            subscription: &MemberSubscription,
            payout_link: Option<&PayoutGatewayLink>,
        ) -> Result<()> {
            if self.inner.fail_inserts.load(Ordering::SeqCst) {
                return Err(SubscriptionError::InsertionFailed {
                    member_id: subscription.member_id.clone(),
                }
                .into());
            }

            // Take both locks before writing so the pair lands together.
            let mut subs = self.inner.subscriptions.write().unwrap();
            let mut links = self.inner.payout_links.write().unwrap();
            subs.insert(subscription.id.clone(), subscription.clone());
            if let Some(link) = payout_link {
                links.push(link.clone());
            }
            Ok(())
        }

        async fn renew_subscription(&self, update: &RenewalUpdate) -> Result<bool> {
            if self.stale() {
                return Ok(false);
            }
            let mut subs = self.inner.subscriptions.write().unwrap();
            match subs.get_mut(&update.subscription_id) {
                Some(sub)
                    if sub.status == update.observed_status
                        && sub.expiration_date == update.observed_expiration =>
                {
                    sub.expiration_date = update.new_expiration;
                    sub.status = SubscriptionStatus::Active;
                    sub.renewed_on = Some(update.renewed_on);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn update_subscription_status(&self, update: &StatusUpdate) -> Result<bool> {
            if self.stale() {
                return Ok(false);
            }
            let mut subs = self.inner.subscriptions.write().unwrap();
            match subs.get_mut(&update.subscription_id) {
                Some(sub) if sub.status == update.observed_status => {
                    sub.status = update.new_status;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn reassign_product(&self, reassignment: &ProductReassignment) -> Result<bool> {
            if self.stale() {
                return Ok(false);
            }
            let mut products = self.inner.products.write().unwrap();
            match products.get_mut(&reassignment.product_id) {
                Some(product)
                    if product.member_id == reassignment.member_id
                        && product.member_subscription_id == reassignment.from_subscription_id =>
                {
                    product.member_subscription_id = reassignment.to_subscription_id.clone();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
