//! Subscription domain types.
//!
//! Plans are immutable catalog rows. Member subscriptions are created by
//! checkout and only ever mutated by renewal and cancellation. Products and
//! members belong to other subsystems and are read here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored subscription status.
///
/// Grace, warning and past-grace are derived from dates on every read and
/// are never stored. `Expired` exists in the catalog of status values but
/// this engine never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Reserved for external payment flows; no processor produces it.
    Processing,
    Active,
    OnHold,
    PaymentFailed,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    /// All status values, in catalog order.
    pub const ALL: [SubscriptionStatus; 6] = [
        Self::Processing,
        Self::Active,
        Self::OnHold,
        Self::PaymentFailed,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Parse a stored status name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "processing" => Some(Self::Processing),
            "active" => Some(Self::Active),
            "on_hold" => Some(Self::OnHold),
            "payment_failed" => Some(Self::PaymentFailed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Stored name of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::PaymentFailed => "payment_failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Statuses a renewal may start from.
    #[must_use]
    pub fn is_renewable(&self) -> bool {
        matches!(self, Self::Active | Self::OnHold | Self::PaymentFailed)
    }

    /// Statuses a cancellation may start from.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Active | Self::OnHold)
    }

    /// Whether the subscription still counts as held by the member.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_renewable()
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription plan from the catalog.
///
/// `duration` and `renewable_within` are counts of the engine's configured
/// period unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    /// Length of one subscription term.
    pub duration: u32,
    /// Length of the grace window after expiration.
    pub renewable_within: u32,
    /// Maximum products that may count against one subscription.
    pub product_count: u32,
    pub track_count: u32,
    pub artist_count: u32,
    pub max_tracks_per_product: u32,
    pub max_artists_per_product: u32,
    /// Maximum subscriptions a member may open on this plan per calendar year.
    pub yearly_subscription_limit: Option<u32>,
    pub is_free: bool,
    pub is_one_time: bool,
    pub is_cancellation_enabled: bool,
    pub is_active: bool,
    pub currency: String,
    /// Price in minor units, passed through to payout links.
    pub amount: i64,
    /// Tax in minor units, passed through to payout links.
    pub tax: i64,
}

impl SubscriptionPlan {
    /// Create an active, paid, cancellable plan with no capacity limits set.
    #[must_use]
    pub fn new(id: impl Into<String>, duration: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            duration,
            renewable_within: 0,
            product_count: 0,
            track_count: 0,
            artist_count: 0,
            max_tracks_per_product: 0,
            max_artists_per_product: 0,
            yearly_subscription_limit: None,
            is_free: false,
            is_one_time: false,
            is_cancellation_enabled: true,
            is_active: true,
            currency: "usd".to_string(),
            amount: 0,
            tax: 0,
        }
    }

    /// The dimensions compared when a product moves between plans.
    #[must_use]
    pub fn capacity(&self) -> PlanCapacity {
        PlanCapacity {
            artist_count: self.artist_count,
            track_count: self.track_count,
            max_tracks_per_product: self.max_tracks_per_product,
            max_artists_per_product: self.max_artists_per_product,
        }
    }

    /// Whether members can be checked out into this plan at all.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.duration > 0
    }
}

/// Capacity limits compared during product migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCapacity {
    pub artist_count: u32,
    pub track_count: u32,
    pub max_tracks_per_product: u32,
    pub max_artists_per_product: u32,
}

impl PlanCapacity {
    /// True when every dimension is at least as large as `other`'s.
    #[must_use]
    pub fn covers(&self, other: &PlanCapacity) -> bool {
        self.shortfalls(other).is_empty()
    }

    /// Names of the dimensions where `self` is smaller than `other`.
    #[must_use]
    pub fn shortfalls(&self, other: &PlanCapacity) -> Vec<&'static str> {
        let mut short = Vec::new();
        if self.artist_count < other.artist_count {
            short.push("artist_count");
        }
        if self.track_count < other.track_count {
            short.push("track_count");
        }
        if self.max_tracks_per_product < other.max_tracks_per_product {
            short.push("max_tracks_per_product");
        }
        if self.max_artists_per_product < other.max_artists_per_product {
            short.push("max_artists_per_product");
        }
        short
    }
}

/// A member's subscription to a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSubscription {
    pub id: String,
    pub member_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub expiration_date: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    pub renewed_on: Option<NaiveDate>,
    pub custom_name: Option<String>,
}

impl MemberSubscription {
    /// Display name: the custom name if set, otherwise the plan name.
    #[must_use]
    pub fn display_name<'a>(&'a self, plan: &'a SubscriptionPlan) -> &'a str {
        self.custom_name.as_deref().unwrap_or(&plan.name)
    }
}

/// A content item counted against a member subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub member_id: String,
    pub member_subscription_id: String,
    pub release_end_date: Option<NaiveDate>,
}

impl Product {
    /// A product is live while its release end date is after `today`.
    #[must_use]
    pub fn is_live_on(&self, today: NaiveDate) -> bool {
        self.release_end_date.is_some_and(|end| end > today)
    }
}

/// Payout linkage created for paid checkouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutGatewayLink {
    pub member_id: String,
    pub payment_gateway_id: i64,
    pub currency: String,
    /// Opaque details blob, seeded from the plan's amount and tax.
    pub payment_details: serde_json::Value,
}

impl PayoutGatewayLink {
    /// Build the link for a paid checkout of `plan`.
    #[must_use]
    pub fn for_plan(member_id: &str, payment_gateway_id: i64, plan: &SubscriptionPlan) -> Self {
        Self {
            member_id: member_id.to_string(),
            payment_gateway_id,
            currency: plan.currency.clone(),
            payment_details: serde_json::json!({
                "amount": plan.amount,
                "tax": plan.tax,
            }),
        }
    }
}

/// Member record as seen by this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub partner_id: String,
}

/// Payment gateway catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentGateway {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

/// A partner's endorsement of a payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerGateway {
    pub partner_id: String,
    pub payment_gateway_id: i64,
    /// Encrypted payment details, readable only through the decryption service.
    pub payment_details: String,
}

/// Authenticated caller identity supplied by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub member_id: String,
    pub partner_id: String,
}

impl MemberIdentity {
    #[must_use]
    pub fn new(member_id: impl Into<String>, partner_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            partner_id: partner_id.into(),
        }
    }
}
