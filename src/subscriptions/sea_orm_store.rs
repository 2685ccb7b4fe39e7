//! SeaORM-backed membership storage.
//!
//! Implements both [`PlanCatalog`] and [`MembershipStore`] over a single
//! connection. Guarded writes are single `UPDATE ... WHERE` statements whose
//! filters carry the observed state, so a lost race shows up as zero affected
//! rows rather than an overwrite.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE subscription_plans (
//!     id TEXT PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     duration INTEGER NOT NULL,
//!     renewable_within INTEGER NOT NULL DEFAULT 0,
//!     product_count INTEGER NOT NULL DEFAULT 0,
//!     track_count INTEGER NOT NULL DEFAULT 0,
//!     artist_count INTEGER NOT NULL DEFAULT 0,
//!     max_tracks_per_product INTEGER NOT NULL DEFAULT 0,
//!     max_artists_per_product INTEGER NOT NULL DEFAULT 0,
//!     yearly_subscription_limit INTEGER,
//!     is_free BOOLEAN NOT NULL DEFAULT FALSE,
//!     is_one_time BOOLEAN NOT NULL DEFAULT FALSE,
//!     is_cancellation_enabled BOOLEAN NOT NULL DEFAULT TRUE,
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE,
//!     currency TEXT NOT NULL,
//!     amount BIGINT NOT NULL DEFAULT 0,
//!     tax BIGINT NOT NULL DEFAULT 0
//! );
//!
//! CREATE TABLE members (
//!     id TEXT PRIMARY KEY,
//!     partner_id TEXT NOT NULL
//! );
//!
//! CREATE TABLE payment_gateways (
//!     id BIGINT PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     is_active BOOLEAN NOT NULL DEFAULT TRUE
//! );
//!
//! CREATE TABLE partner_payment_gateways (
//!     partner_id TEXT NOT NULL,
//!     payment_gateway_id BIGINT NOT NULL REFERENCES payment_gateways (id),
//!     payment_details TEXT NOT NULL,
//!     PRIMARY KEY (partner_id, payment_gateway_id)
//! );
//!
//! CREATE TABLE member_subscriptions (
//!     id TEXT PRIMARY KEY,
//!     member_id TEXT NOT NULL REFERENCES members (id),
//!     plan_id TEXT NOT NULL REFERENCES subscription_plans (id),
//!     status TEXT NOT NULL,
//!     expiration_date TIMESTAMPTZ NOT NULL,
//!     created_on TIMESTAMPTZ NOT NULL,
//!     renewed_on DATE,
//!     custom_name TEXT
//! );
//! CREATE INDEX member_subscriptions_member_plan
//!     ON member_subscriptions (member_id, plan_id, created_on);
//!
//! -- Checkout rejects a second free or one-time subscription before
//! -- inserting. To close the race in the database as well, maintain an
//! -- `exclusive_plan` column from the plan row and add:
//! --   CREATE UNIQUE INDEX member_subscriptions_exclusive
//! --       ON member_subscriptions (member_id, plan_id)
//! --       WHERE exclusive_plan AND status <> 'cancelled';
//!
//! CREATE TABLE products (
//!     id TEXT PRIMARY KEY,
//!     member_id TEXT NOT NULL REFERENCES members (id),
//!     member_subscription_id TEXT NOT NULL REFERENCES member_subscriptions (id),
//!     release_end_date DATE
//! );
//!
//! CREATE TABLE payout_gateway_links (
//!     id BIGSERIAL PRIMARY KEY,
//!     member_id TEXT NOT NULL REFERENCES members (id),
//!     payment_gateway_id BIGINT NOT NULL REFERENCES payment_gateways (id),
//!     currency TEXT NOT NULL,
//!     payment_details JSONB NOT NULL
//! );
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use memberflow::database::SeaOrmPool;
//! use memberflow::subscriptions::{SeaOrmMembershipStore, SubscriptionService};
//!
//! let pool = SeaOrmPool::from_config(&config.database).await?;
//! let store = Arc::new(SeaOrmMembershipStore::new(pool.into_inner()));
//! let service = SubscriptionService::new(store.clone(), store, decryptor);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait, UpdateMany, sea_query::Expr,
};

use crate::error::{MemberflowError, Result};

use super::error::SubscriptionError;
use super::storage::{MembershipStore, PlanCatalog, ProductReassignment, RenewalUpdate, StatusUpdate};
use super::types::{
    Member, MemberSubscription, PartnerGateway, PaymentGateway, PayoutGatewayLink, Product,
    SubscriptionPlan, SubscriptionStatus,
};

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    pub mod subscription_plan {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "subscription_plans")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub name: String,
            pub duration: i32,
            pub renewable_within: i32,
            pub product_count: i32,
            pub track_count: i32,
            pub artist_count: i32,
            pub max_tracks_per_product: i32,
            pub max_artists_per_product: i32,
            pub yearly_subscription_limit: Option<i32>,
            pub is_free: bool,
            pub is_one_time: bool,
            pub is_cancellation_enabled: bool,
            pub is_active: bool,
            pub currency: String,
            pub amount: i64,
            pub tax: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod member {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "members")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub partner_id: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod payment_gateway {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "payment_gateways")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i64,
            pub name: String,
            pub is_active: bool,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod partner_gateway {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "partner_payment_gateways")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub partner_id: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub payment_gateway_id: i64,
            pub payment_details: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod member_subscription {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "member_subscriptions")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub member_id: String,
            pub plan_id: String,
            pub status: String,
            pub expiration_date: DateTimeUtc,
            pub created_on: DateTimeUtc,
            pub renewed_on: Option<Date>,
            pub custom_name: Option<String>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod product {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "products")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub member_id: String,
            pub member_subscription_id: String,
            pub release_end_date: Option<Date>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod payout_link {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "payout_gateway_links")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub member_id: String,
            pub payment_gateway_id: i64,
            pub currency: String,
            #[sea_orm(column_type = "JsonBinary")]
            pub payment_details: Json,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{
    member, member_subscription, partner_gateway, payment_gateway, payout_link, product,
    subscription_plan,
};

// =============================================================================
// Conversions
// =============================================================================

/// Negative stored counts read as zero.
fn i32_to_u32(v: i32) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

fn u32_to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn model_to_plan(model: subscription_plan::Model) -> SubscriptionPlan {
    SubscriptionPlan {
        id: model.id,
        name: model.name,
        duration: i32_to_u32(model.duration),
        renewable_within: i32_to_u32(model.renewable_within),
        product_count: i32_to_u32(model.product_count),
        track_count: i32_to_u32(model.track_count),
        artist_count: i32_to_u32(model.artist_count),
        max_tracks_per_product: i32_to_u32(model.max_tracks_per_product),
        max_artists_per_product: i32_to_u32(model.max_artists_per_product),
        yearly_subscription_limit: model.yearly_subscription_limit.map(i32_to_u32),
        is_free: model.is_free,
        is_one_time: model.is_one_time,
        is_cancellation_enabled: model.is_cancellation_enabled,
        is_active: model.is_active,
        currency: model.currency,
        amount: model.amount,
        tax: model.tax,
    }
}

fn model_to_subscription(model: member_subscription::Model) -> Result<MemberSubscription> {
    let status = SubscriptionStatus::from_name(&model.status).ok_or_else(|| {
        tracing::error!(
            subscription_id = %model.id,
            status = %model.status,
            "unknown subscription status in storage"
        );
        MemberflowError::internal(format!("unknown status '{}' on subscription {}", model.status, model.id))
    })?;

    Ok(MemberSubscription {
        id: model.id,
        member_id: model.member_id,
        plan_id: model.plan_id,
        status,
        expiration_date: model.expiration_date,
        created_on: model.created_on,
        renewed_on: model.renewed_on,
        custom_name: model.custom_name,
    })
}

fn subscription_to_active_model(subscription: &MemberSubscription) -> member_subscription::ActiveModel {
    member_subscription::ActiveModel {
        id: Set(subscription.id.clone()),
        member_id: Set(subscription.member_id.clone()),
        plan_id: Set(subscription.plan_id.clone()),
        status: Set(subscription.status.as_str().to_string()),
        expiration_date: Set(subscription.expiration_date),
        created_on: Set(subscription.created_on),
        renewed_on: Set(subscription.renewed_on),
        custom_name: Set(subscription.custom_name.clone()),
    }
}

fn link_to_active_model(link: &PayoutGatewayLink) -> payout_link::ActiveModel {
    payout_link::ActiveModel {
        id: NotSet,
        member_id: Set(link.member_id.clone()),
        payment_gateway_id: Set(link.payment_gateway_id),
        currency: Set(link.currency.clone()),
        payment_details: Set(link.payment_details.clone()),
    }
}

fn model_to_product(model: product::Model) -> Product {
    Product {
        id: model.id,
        member_id: model.member_id,
        member_subscription_id: model.member_subscription_id,
        release_end_date: model.release_end_date,
    }
}

fn collect_subscriptions(models: Vec<member_subscription::Model>) -> Result<Vec<MemberSubscription>> {
    models.into_iter().map(model_to_subscription).collect()
}

// =============================================================================
// SeaOrmMembershipStore
// =============================================================================

/// SeaORM-backed store implementing [`PlanCatalog`] and [`MembershipStore`].
#[derive(Clone, Debug)]
pub struct SeaOrmMembershipStore {
    db: DatabaseConnection,
}

impl SeaOrmMembershipStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl PlanCatalog for SeaOrmMembershipStore {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<SubscriptionPlan>> {
        let plan = subscription_plan::Entity::find_by_id(plan_id.to_string())
            .one(&self.db)
            .await?;
        Ok(plan.map(model_to_plan))
    }

    async fn list_plans(&self) -> Result<Vec<SubscriptionPlan>> {
        let plans = subscription_plan::Entity::find()
            .order_by_asc(subscription_plan::Column::Id)
            .all(&self.db)
            .await?;
        Ok(plans.into_iter().map(model_to_plan).collect())
    }

    async fn get_plans(&self, plan_ids: &[String]) -> Result<Vec<SubscriptionPlan>> {
        if plan_ids.is_empty() {
            return Ok(Vec::new());
        }
        let plans = subscription_plan::Entity::find()
            .filter(subscription_plan::Column::Id.is_in(plan_ids.iter().map(String::as_str)))
            .order_by_asc(subscription_plan::Column::Id)
            .all(&self.db)
            .await?;
        Ok(plans.into_iter().map(model_to_plan).collect())
    }
}

#[async_trait]
impl MembershipStore for SeaOrmMembershipStore {
    async fn get_member(&self, member_id: &str) -> Result<Option<Member>> {
        let member = member::Entity::find_by_id(member_id.to_string())
            .one(&self.db)
            .await?;
        Ok(member.map(|m| Member {
            id: m.id,
            partner_id: m.partner_id,
        }))
    }

    async fn get_payment_gateway(&self, gateway_id: i64) -> Result<Option<PaymentGateway>> {
        let gateway = payment_gateway::Entity::find_by_id(gateway_id)
            .one(&self.db)
            .await?;
        Ok(gateway.map(|g| PaymentGateway {
            id: g.id,
            name: g.name,
            is_active: g.is_active,
        }))
    }

    async fn get_partner_gateway(
        &self,
        partner_id: &str,
        gateway_id: i64,
    ) -> Result<Option<PartnerGateway>> {
        let endorsement = partner_gateway::Entity::find_by_id((partner_id.to_string(), gateway_id))
            .one(&self.db)
            .await?;
        Ok(endorsement.map(|e| PartnerGateway {
            partner_id: e.partner_id,
            payment_gateway_id: e.payment_gateway_id,
            payment_details: e.payment_details,
        }))
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<MemberSubscription>> {
        member_subscription::Entity::find_by_id(subscription_id.to_string())
            .one(&self.db)
            .await?
            .map(model_to_subscription)
            .transpose()
    }

    async fn list_member_subscriptions(&self, member_id: &str) -> Result<Vec<MemberSubscription>> {
        let models = member_subscription::Entity::find()
            .filter(member_subscription::Column::MemberId.eq(member_id))
            .order_by_asc(member_subscription::Column::CreatedOn)
            .order_by_asc(member_subscription::Column::Id)
            .all(&self.db)
            .await?;
        collect_subscriptions(models)
    }

    async fn count_plan_subscriptions_since(
        &self,
        member_id: &str,
        plan_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let count = member_subscription::Entity::find()
            .filter(member_subscription::Column::MemberId.eq(member_id))
            .filter(member_subscription::Column::PlanId.eq(plan_id))
            .filter(member_subscription::Column::CreatedOn.gte(since))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn find_member_plan_subscriptions(
        &self,
        member_id: &str,
        plan_id: &str,
    ) -> Result<Vec<MemberSubscription>> {
        let models = member_subscription::Entity::find()
            .filter(member_subscription::Column::MemberId.eq(member_id))
            .filter(member_subscription::Column::PlanId.eq(plan_id))
            .order_by_asc(member_subscription::Column::CreatedOn)
            .order_by_asc(member_subscription::Column::Id)
            .all(&self.db)
            .await?;
        collect_subscriptions(models)
    }

    async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let product = product::Entity::find_by_id(product_id.to_string())
            .one(&self.db)
            .await?;
        Ok(product.map(model_to_product))
    }

    async fn list_subscription_products(&self, subscription_id: &str) -> Result<Vec<Product>> {
        let products = product::Entity::find()
            .filter(product::Column::MemberSubscriptionId.eq(subscription_id))
            .order_by_asc(product::Column::Id)
            .all(&self.db)
            .await?;
        Ok(products.into_iter().map(model_to_product).collect())
    }

    async fn count_subscription_products(&self, subscription_id: &str) -> Result<u64> {
        let count = product::Entity::find()
            .filter(product::Column::MemberSubscriptionId.eq(subscription_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn create_subscription(
        &self,
        subscription: &MemberSubscription,
        payout_link: Option<&PayoutGatewayLink>,
    ) -> Result<()> {
        tracing::debug!(
            subscription_id = %subscription.id,
            member_id = %subscription.member_id,
            with_payout_link = payout_link.is_some(),
            "inserting subscription"
        );

        // Dropping the transaction without commit rolls it back.
        let txn = self.db.begin().await?;

        let inserted = member_subscription::Entity::insert(subscription_to_active_model(subscription))
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            txn.rollback().await?;
            return Err(SubscriptionError::InsertionFailed {
                member_id: subscription.member_id.clone(),
            }
            .into());
        }

        if let Some(link) = payout_link {
            payout_link::Entity::insert(link_to_active_model(link))
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn renew_subscription(&self, update: &RenewalUpdate) -> Result<bool> {
        let result = renewal_statement(update).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn update_subscription_status(&self, update: &StatusUpdate) -> Result<bool> {
        let result = status_statement(update).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn reassign_product(&self, reassignment: &ProductReassignment) -> Result<bool> {
        let result = reassignment_statement(reassignment).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}

// Each guarded write is one UPDATE; no transaction is opened around it.

fn renewal_statement(update: &RenewalUpdate) -> UpdateMany<member_subscription::Entity> {
    member_subscription::Entity::update_many()
        .col_expr(
            member_subscription::Column::ExpirationDate,
            Expr::value(update.new_expiration),
        )
        .col_expr(
            member_subscription::Column::Status,
            Expr::value(SubscriptionStatus::Active.as_str()),
        )
        .col_expr(
            member_subscription::Column::RenewedOn,
            Expr::value(update.renewed_on),
        )
        .filter(member_subscription::Column::Id.eq(update.subscription_id.as_str()))
        .filter(member_subscription::Column::Status.eq(update.observed_status.as_str()))
        .filter(member_subscription::Column::ExpirationDate.eq(update.observed_expiration))
}

fn status_statement(update: &StatusUpdate) -> UpdateMany<member_subscription::Entity> {
    member_subscription::Entity::update_many()
        .col_expr(
            member_subscription::Column::Status,
            Expr::value(update.new_status.as_str()),
        )
        .filter(member_subscription::Column::Id.eq(update.subscription_id.as_str()))
        .filter(member_subscription::Column::Status.eq(update.observed_status.as_str()))
}

fn reassignment_statement(reassignment: &ProductReassignment) -> UpdateMany<product::Entity> {
    product::Entity::update_many()
        .col_expr(
            product::Column::MemberSubscriptionId,
            Expr::value(reassignment.to_subscription_id.as_str()),
        )
        .filter(product::Column::Id.eq(reassignment.product_id.as_str()))
        .filter(product::Column::MemberId.eq(reassignment.member_id.as_str()))
        .filter(product::Column::MemberSubscriptionId.eq(reassignment.from_subscription_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use sea_orm::{DbBackend, QueryTrait};

    fn plan_model() -> subscription_plan::Model {
        subscription_plan::Model {
            id: "pro".to_string(),
            name: "Pro".to_string(),
            duration: 4,
            renewable_within: 2,
            product_count: 10,
            track_count: 200,
            artist_count: 5,
            max_tracks_per_product: 20,
            max_artists_per_product: -3,
            yearly_subscription_limit: Some(2),
            is_free: false,
            is_one_time: false,
            is_cancellation_enabled: true,
            is_active: true,
            currency: "usd".to_string(),
            amount: 1999,
            tax: 200,
        }
    }

    #[test]
    fn test_model_to_plan() {
        let plan = model_to_plan(plan_model());
        assert_eq!(plan.id, "pro");
        assert_eq!(plan.duration, 4);
        assert_eq!(plan.renewable_within, 2);
        assert_eq!(plan.artist_count, 5);
        assert_eq!(plan.max_artists_per_product, 0);
        assert_eq!(plan.yearly_subscription_limit, Some(2));
        assert_eq!(plan.amount, 1999);
    }

    #[test]
    fn test_subscription_conversion() {
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let model = member_subscription::Model {
            id: "s1".to_string(),
            member_id: "m1".to_string(),
            plan_id: "pro".to_string(),
            status: "on_hold".to_string(),
            expiration_date: created + chrono::Duration::weeks(4),
            created_on: created,
            renewed_on: NaiveDate::from_ymd_opt(2026, 1, 20),
            custom_name: Some("Label".to_string()),
        };

        let subscription = model_to_subscription(model).unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::OnHold);
        assert_eq!(subscription.renewed_on, NaiveDate::from_ymd_opt(2026, 1, 20));

        let active = subscription_to_active_model(&subscription);
        assert_eq!(active.status, Set("on_hold".to_string()));
        assert_eq!(active.expiration_date, Set(subscription.expiration_date));
    }

    #[test]
    fn test_unknown_status_is_internal() {
        let now = Utc::now();
        let model = member_subscription::Model {
            id: "s1".to_string(),
            member_id: "m1".to_string(),
            plan_id: "pro".to_string(),
            status: "paused".to_string(),
            expiration_date: now,
            created_on: now,
            renewed_on: None,
            custom_name: None,
        };
        let err = model_to_subscription(model).unwrap_err();
        assert!(err.is_server_error());
    }

    #[test]
    fn test_payout_link_leaves_id_to_database() {
        let link = PayoutGatewayLink::for_plan("m1", 3, &model_to_plan(plan_model()));
        let active = link_to_active_model(&link);
        assert!(matches!(active.id, NotSet));
        assert_eq!(active.payment_gateway_id, Set(3));
    }

    #[test]
    fn test_safe_integer_conversions() {
        assert_eq!(i32_to_u32(-1), 0);
        assert_eq!(i32_to_u32(7), 7);
        assert_eq!(u32_to_i32(u32::MAX), i32::MAX);
        assert_eq!(u32_to_i32(7), 7);
    }

    fn sql<E: EntityTrait>(statement: UpdateMany<E>) -> String {
        statement.build(DbBackend::Postgres).to_string()
    }

    #[test]
    fn test_guarded_writes_are_single_updates() {
        let renewal = sql(renewal_statement(&RenewalUpdate {
            subscription_id: "ms_1".to_string(),
            observed_status: SubscriptionStatus::OnHold,
            observed_expiration: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            new_expiration: Utc.with_ymd_and_hms(2026, 5, 11, 0, 0, 0).unwrap(),
            renewed_on: NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
        }));
        assert!(renewal.starts_with(r#"UPDATE "member_subscriptions" SET"#));
        assert_eq!(renewal.matches("UPDATE").count(), 1);
        let guard = &renewal[renewal.find("WHERE").unwrap()..];
        assert!(guard.contains(r#""id" = 'ms_1'"#));
        assert!(guard.contains(r#""status" = 'on_hold'"#));
        assert!(guard.contains(r#""expiration_date" = '2026-05-01"#));

        let status = sql(status_statement(&StatusUpdate {
            subscription_id: "ms_1".to_string(),
            observed_status: SubscriptionStatus::Active,
            new_status: SubscriptionStatus::Cancelled,
        }));
        assert!(status.contains(r#"SET "status" = 'cancelled' WHERE"#));
        assert!(status.ends_with(r#""status" = 'active'"#));

        let reassignment = sql(reassignment_statement(&ProductReassignment {
            product_id: "p1".to_string(),
            member_id: "m1".to_string(),
            from_subscription_id: "ms_1".to_string(),
            to_subscription_id: "ms_2".to_string(),
        }));
        assert!(reassignment.starts_with(r#"UPDATE "products" SET "member_subscription_id" = 'ms_2' WHERE"#));
        assert!(reassignment.contains(r#""member_subscription_id" = 'ms_1'"#));
    }
}
