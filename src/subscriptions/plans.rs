//! Plan capability lookups.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

use super::error::SubscriptionError;
use super::storage::{MembershipStore, PlanCatalog};
use super::types::{MemberSubscription, SubscriptionPlan};

/// Read-only plan queries over the injected catalog.
pub struct PlanReader<P: PlanCatalog> {
    catalog: Arc<P>,
}

impl<P: PlanCatalog> Clone for PlanReader<P> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<P: PlanCatalog> PlanReader<P> {
    #[must_use]
    pub fn new(catalog: Arc<P>) -> Self {
        Self { catalog }
    }

    /// Look up a plan, treating absence as "no such plan".
    pub async fn find(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>> {
        debug!(plan_id = %plan_id, "loading plan");
        self.catalog.get_plan(plan_id).await
    }

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// `NotFound` when the plan does not exist.
    pub async fn plan(&self, plan_id: &str) -> Result<SubscriptionPlan> {
        self.find(plan_id).await?.ok_or_else(|| {
            SubscriptionError::PlanNotFound {
                plan_id: plan_id.to_string(),
            }
            .into()
        })
    }

    /// Get the plan a member subscription is on.
    ///
    /// # Errors
    ///
    /// `NotFound` when the subscription does not exist; `Internal` when it
    /// points at a plan that is gone from the catalog.
    pub async fn plan_for_subscription<S: MembershipStore>(
        &self,
        store: &S,
        subscription_id: &str,
    ) -> Result<SubscriptionPlan> {
        let subscription = store.get_subscription(subscription_id).await?.ok_or_else(|| {
            SubscriptionError::SubscriptionNotFound {
                subscription_id: subscription_id.to_string(),
            }
        })?;
        self.plan_of(&subscription).await
    }

    /// Get the plan of an already-loaded subscription.
    ///
    /// # Errors
    ///
    /// `Internal` when the plan is missing from the catalog.
    pub async fn plan_of(&self, subscription: &MemberSubscription) -> Result<SubscriptionPlan> {
        self.find(&subscription.plan_id).await?.ok_or_else(|| {
            tracing::error!(
                subscription_id = %subscription.id,
                plan_id = %subscription.plan_id,
                "subscription references a missing plan"
            );
            SubscriptionError::DanglingPlan {
                subscription_id: subscription.id.clone(),
                plan_id: subscription.plan_id.clone(),
            }
            .into()
        })
    }

    /// All plans in the catalog.
    pub async fn list(&self) -> Result<Vec<SubscriptionPlan>> {
        self.catalog.list_plans().await
    }

    /// Active plans members can currently buy.
    pub async fn purchasable(&self) -> Result<Vec<SubscriptionPlan>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(SubscriptionPlan::is_purchasable)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemberflowError;
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use crate::subscriptions::types::SubscriptionStatus;
    use chrono::Utc;

    fn setup() -> (Arc<InMemoryMembershipStore>, PlanReader<InMemoryMembershipStore>) {
        let store = Arc::new(InMemoryMembershipStore::new());
        let mut retired = SubscriptionPlan::new("retired", 4);
        retired.is_active = false;
        store.seed_plans(vec![SubscriptionPlan::new("pro", 4), retired, SubscriptionPlan::new("zero", 0)]);
        let reader = PlanReader::new(Arc::clone(&store));
        (store, reader)
    }

    fn subscription(id: &str, plan_id: &str) -> MemberSubscription {
        MemberSubscription {
            id: id.to_string(),
            member_id: "m1".to_string(),
            plan_id: plan_id.to_string(),
            status: SubscriptionStatus::Active,
            expiration_date: Utc::now(),
            created_on: Utc::now(),
            renewed_on: None,
            custom_name: None,
        }
    }

    #[tokio::test]
    async fn test_plan_lookup() {
        let (_, reader) = setup();
        assert_eq!(reader.plan("pro").await.unwrap().id, "pro");
        assert!(matches!(reader.plan("nope").await, Err(MemberflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_plan_for_subscription() {
        let (store, reader) = setup();
        store.seed_subscription(subscription("s1", "pro"));
        store.seed_subscription(subscription("s2", "vanished"));

        assert_eq!(reader.plan_for_subscription(&*store, "s1").await.unwrap().id, "pro");
        assert!(matches!(
            reader.plan_for_subscription(&*store, "missing").await,
            Err(MemberflowError::NotFound(_))
        ));
        assert!(matches!(
            reader.plan_for_subscription(&*store, "s2").await,
            Err(MemberflowError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_purchasable_excludes_inactive_and_zero_duration() {
        let (_, reader) = setup();
        let ids: Vec<_> = reader.purchasable().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["pro"]);
    }
}
