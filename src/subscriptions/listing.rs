//! Paginated read model over a member's subscriptions.
//!
//! Each row carries the derived period flags so callers never recompute
//! grace or warning state themselves.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::Result;

use super::clock::SharedClock;
use super::config::EngineConfig;
use super::error::SubscriptionError;
use super::periods::PeriodCalculator;
use super::storage::{MembershipStore, PlanCatalog};
use super::types::{MemberIdentity, MemberSubscription, SubscriptionPlan, SubscriptionStatus};

/// Sort key for listing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    #[default]
    CreatedOn,
    ExpirationDate,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,

    /// Items per page; the configured default when absent
    #[serde(default)]
    pub per_page: Option<u32>,

    #[serde(default)]
    pub status: Option<SubscriptionStatus>,

    /// Case-insensitive match against custom name and plan name
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub sort: ListingSort,

    #[serde(default)]
    pub order: SortOrder,
}

fn default_page() -> u32 {
    1
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: None,
            status: None,
            search: None,
            sort: ListingSort::default(),
            order: SortOrder::default(),
        }
    }
}

/// One subscription with its derived state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionListItem {
    pub id: String,
    pub plan_id: String,
    pub plan_name: String,
    /// Custom name when set, otherwise the plan name
    pub name: String,
    pub custom_name: Option<String>,
    pub status: SubscriptionStatus,
    pub status_name: &'static str,
    pub expiration_date: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    pub renewed_on: Option<NaiveDate>,
    pub is_free: bool,
    pub in_grace: bool,
    pub in_warning: bool,
    pub past_grace: bool,
    pub warning_message: Option<String>,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingPage {
    pub items: Vec<SubscriptionListItem>,
    pub pagination: PaginationMeta,
}

/// Builds listing pages from the store and catalog.
pub struct SubscriptionListing<S: MembershipStore, P: PlanCatalog> {
    store: Arc<S>,
    catalog: Arc<P>,
    periods: PeriodCalculator,
    config: EngineConfig,
    clock: SharedClock,
}

impl<S: MembershipStore, P: PlanCatalog> SubscriptionListing<S, P> {
    pub fn new(store: Arc<S>, catalog: Arc<P>, config: EngineConfig, clock: SharedClock) -> Self {
        Self {
            store,
            catalog,
            periods: PeriodCalculator::from_config(&config),
            config,
            clock,
        }
    }

    /// One page of the caller's subscriptions.
    ///
    /// `per_page` above the configured maximum is clamped.
    ///
    /// # Errors
    ///
    /// `BadRequest` for page 0 or per_page 0; `NotFound` for an unknown
    /// member; `Forbidden` when the caller's partner is not the member's;
    /// `Internal` when a subscription references a plan missing from the
    /// catalog.
    #[instrument(skip(self, identity, query), fields(member_id = %identity.member_id, page = query.page))]
    pub async fn list(&self, identity: &MemberIdentity, query: &ListingQuery) -> Result<ListingPage> {
        if query.page == 0 {
            return Err(SubscriptionError::InvalidListingQuery {
                message: "page must be >= 1".to_string(),
            }
            .into());
        }
        let per_page = match query.per_page {
            Some(0) => {
                return Err(SubscriptionError::InvalidListingQuery {
                    message: "per_page must be >= 1".to_string(),
                }
                .into());
            }
            Some(n) => n.min(self.config.listing_max_per_page),
            None => self.config.listing_default_per_page,
        };

        let member_id = identity.member_id.as_str();
        match self.store.get_member(member_id).await? {
            None => {
                return Err(SubscriptionError::MemberNotFound {
                    member_id: member_id.to_string(),
                }
                .into());
            }
            Some(member) if member.partner_id != identity.partner_id => {
                debug!(member_id = %member.id, "listing refused for foreign partner");
                return Err(SubscriptionError::PartnerMismatch {
                    member_id: member_id.to_string(),
                }
                .into());
            }
            Some(_) => {}
        }

        let subscriptions = self.store.list_member_subscriptions(member_id).await?;
        let plans = self.load_plans(&subscriptions).await?;
        let now = self.clock.now();
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows = Vec::with_capacity(subscriptions.len());
        for sub in subscriptions {
            if query.status.is_some_and(|status| status != sub.status) {
                continue;
            }
            let plan = plans.get(&sub.plan_id).ok_or_else(|| SubscriptionError::DanglingPlan {
                subscription_id: sub.id.clone(),
                plan_id: sub.plan_id.clone(),
            })?;
            if let Some(needle) = &needle {
                let custom = sub.custom_name.as_deref().unwrap_or_default().to_lowercase();
                if !custom.contains(needle) && !plan.name.to_lowercase().contains(needle) {
                    continue;
                }
            }
            rows.push(self.item(sub, plan, now));
        }

        rows.sort_by(|a, b| {
            let ord = compare(a, b, query.sort).then_with(|| a.id.cmp(&b.id));
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = rows.len() as u64;
        let offset = (query.page as usize - 1).saturating_mul(per_page as usize);
        let items: Vec<_> = rows.into_iter().skip(offset).take(per_page as usize).collect();

        debug!(member_id = %member_id, total, returned = items.len(), "listing built");

        Ok(ListingPage {
            items,
            pagination: PaginationMeta {
                total,
                page: query.page,
                per_page,
                total_pages: u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX),
            },
        })
    }

    async fn load_plans(
        &self,
        subscriptions: &[MemberSubscription],
    ) -> Result<HashMap<String, SubscriptionPlan>> {
        let mut ids: Vec<String> = subscriptions.iter().map(|s| s.plan_id.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(self
            .catalog
            .get_plans(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect())
    }

    fn item(&self, sub: MemberSubscription, plan: &SubscriptionPlan, now: DateTime<Utc>) -> SubscriptionListItem {
        let state = self.periods.state(sub.expiration_date, plan, now);
        SubscriptionListItem {
            name: sub.display_name(plan).to_string(),
            id: sub.id,
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            custom_name: sub.custom_name,
            status: sub.status,
            status_name: sub.status.as_str(),
            expiration_date: sub.expiration_date,
            created_on: sub.created_on,
            renewed_on: sub.renewed_on,
            is_free: plan.is_free,
            in_grace: state.in_grace,
            in_warning: state.in_warning,
            past_grace: state.past_grace,
            warning_message: state.warning_message,
        }
    }
}

fn compare(a: &SubscriptionListItem, b: &SubscriptionListItem, sort: ListingSort) -> Ordering {
    match sort {
        ListingSort::CreatedOn => a.created_on.cmp(&b.created_on),
        ListingSort::ExpirationDate => a.expiration_date.cmp(&b.expiration_date),
        ListingSort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemberflowError;
    use crate::subscriptions::clock::FixedClock;
    use crate::subscriptions::config::{GraceBoundary, PeriodUnit};
    use crate::subscriptions::storage::test::InMemoryMembershipStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
    }

    fn sub(id: &str, plan: &str, status: SubscriptionStatus, created: i64, expires: i64, name: Option<&str>) -> MemberSubscription {
        MemberSubscription {
            id: id.to_string(),
            member_id: "m1".to_string(),
            plan_id: plan.to_string(),
            status,
            expiration_date: now() + Duration::days(expires),
            created_on: now() - Duration::days(created),
            renewed_on: None,
            custom_name: name.map(str::to_string),
        }
    }

    fn setup() -> (Arc<InMemoryMembershipStore>, SubscriptionListing<InMemoryMembershipStore, InMemoryMembershipStore>) {
        let store = Arc::new(InMemoryMembershipStore::new());
        store.seed_member("m1", "partner-a");
        let mut gold = SubscriptionPlan::new("gold", 30);
        gold.name = "Gold".to_string();
        gold.renewable_within = 10;
        let mut basic = SubscriptionPlan::new("basic", 30);
        basic.name = "Basic".to_string();
        store.seed_plans(vec![gold, basic]);

        store.seed_subscription(sub("a", "gold", SubscriptionStatus::Active, 30, 50, Some("Label Two")));
        store.seed_subscription(sub("b", "basic", SubscriptionStatus::Cancelled, 20, 10, None));
        store.seed_subscription(sub("c", "gold", SubscriptionStatus::OnHold, 10, -3, None));
        let mut other = sub("z", "gold", SubscriptionStatus::Active, 1, 1, None);
        other.member_id = "m2".to_string();
        store.seed_subscription(other);

        let config = EngineConfig::new()
            .with_period_unit(PeriodUnit::Days)
            .with_grace_boundary(GraceBoundary::Window)
            .with_listing_per_page(2, 3);
        let listing = SubscriptionListing::new(
            Arc::clone(&store),
            Arc::clone(&store),
            config,
            Arc::new(FixedClock::new(now())),
        );
        (store, listing)
    }

    fn caller() -> MemberIdentity {
        MemberIdentity::new("m1", "partner-a")
    }

    fn ids(page: &ListingPage) -> Vec<&str> {
        page.items.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_default_sort_newest_first_with_default_page_size() {
        let (_, listing) = setup();
        let page = listing.list(&caller(), &ListingQuery::default()).await.unwrap();
        assert_eq!(ids(&page), vec!["c", "b"]);
        assert_eq!(
            page.pagination,
            PaginationMeta {
                total: 3,
                page: 1,
                per_page: 2,
                total_pages: 2
            }
        );
    }

    #[tokio::test]
    async fn test_second_page_and_clamp() {
        let (_, listing) = setup();
        let query = ListingQuery {
            page: 2,
            per_page: Some(2),
            ..Default::default()
        };
        assert_eq!(ids(&listing.list(&caller(), &query).await.unwrap()), vec!["a"]);

        let query = ListingQuery {
            per_page: Some(500),
            ..Default::default()
        };
        assert_eq!(listing.list(&caller(), &query).await.unwrap().pagination.per_page, 3);
    }

    #[tokio::test]
    async fn test_filter_search_and_name_sort() {
        let (_, listing) = setup();
        let query = ListingQuery {
            status: Some(SubscriptionStatus::Active),
            ..Default::default()
        };
        assert_eq!(ids(&listing.list(&caller(), &query).await.unwrap()), vec!["a"]);

        let query = ListingQuery {
            search: Some("gold".to_string()),
            sort: ListingSort::Name,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let page = listing.list(&caller(), &query).await.unwrap();
        assert_eq!(ids(&page), vec!["c", "a"]);
        assert_eq!(page.items[0].name, "Gold");
        assert_eq!(page.items[1].name, "Label Two");

        let query = ListingQuery {
            search: Some("  two ".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&listing.list(&caller(), &query).await.unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn test_derived_fields() {
        let (_, listing) = setup();
        let query = ListingQuery {
            sort: ListingSort::ExpirationDate,
            order: SortOrder::Asc,
            per_page: Some(3),
            ..Default::default()
        };
        let page = listing.list(&caller(), &query).await.unwrap();
        assert_eq!(ids(&page), vec!["c", "b", "a"]);

        let lapsed = &page.items[0];
        assert_eq!(lapsed.status_name, "on_hold");
        assert!(lapsed.in_grace);
        assert!(!lapsed.past_grace);

        // expires in 50 days on a 30 day plan: warning window is (-40, +20) days from now
        let warned = &page.items[2];
        assert!(warned.in_warning);
        assert!(warned.warning_message.is_some());
    }

    #[tokio::test]
    async fn test_invalid_paging() {
        let (_, listing) = setup();
        let query = ListingQuery {
            page: 0,
            ..Default::default()
        };
        assert!(matches!(listing.list(&caller(), &query).await, Err(MemberflowError::BadRequest(_))));

        let query = ListingQuery {
            per_page: Some(0),
            ..Default::default()
        };
        assert!(matches!(listing.list(&caller(), &query).await, Err(MemberflowError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_dangling_plan() {
        let (store, listing) = setup();
        store.seed_subscription(sub("d", "gone", SubscriptionStatus::Active, 1, 1, None));
        assert!(matches!(
            listing.list(&caller(), &ListingQuery::default()).await,
            Err(MemberflowError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_partner_and_unknown_member_get_no_rows() {
        let (_, listing) = setup();
        let result = listing
            .list(&MemberIdentity::new("m1", "partner-b"), &ListingQuery::default())
            .await;
        assert!(matches!(result, Err(MemberflowError::Forbidden(_))));

        let result = listing
            .list(&MemberIdentity::new("m9", "partner-a"), &ListingQuery::default())
            .await;
        assert!(matches!(result, Err(MemberflowError::NotFound(_))));
    }

    #[test]
    fn test_query_deserializes_with_defaults() {
        let query: ListingQuery =
            serde_json::from_str(r#"{"status":"on_hold","sort":"expiration_date","order":"asc"}"#).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.status, Some(SubscriptionStatus::OnHold));
        assert_eq!(query.sort, ListingSort::ExpirationDate);
        assert_eq!(query.order, SortOrder::Asc);
    }
}
