//! Request bodies accepted by the lifecycle operations.

use serde::{Deserialize, Serialize};

/// Open a new subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Plan to subscribe to.
    pub subscription_id: String,
    #[serde(default)]
    pub payment_gateway_id: Option<i64>,
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl CheckoutRequest {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            subscription_id: plan_id.into(),
            payment_gateway_id: None,
            custom_name: None,
        }
    }

    #[must_use]
    pub fn with_payment_gateway(mut self, gateway_id: i64) -> Self {
        self.payment_gateway_id = Some(gateway_id);
        self
    }

    #[must_use]
    pub fn with_custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = Some(name.into());
        self
    }
}

/// Extend an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalRequest {
    pub member_subscription_id: String,
    #[serde(default)]
    pub payment_gateway_id: Option<i64>,
}

impl RenewalRequest {
    pub fn new(member_subscription_id: impl Into<String>, payment_gateway_id: i64) -> Self {
        Self {
            member_subscription_id: member_subscription_id.into(),
            payment_gateway_id: Some(payment_gateway_id),
        }
    }
}

/// Cancel an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequest {
    pub member_subscription_id: String,
}

impl CancellationRequest {
    pub fn new(member_subscription_id: impl Into<String>) -> Self {
        Self {
            member_subscription_id: member_subscription_id.into(),
        }
    }
}

/// Move a product to another of the member's subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSwitchRequest {
    pub current_subscription_id: String,
    pub new_subscription_id: String,
    pub product_reference_id: String,
}

impl ProductSwitchRequest {
    pub fn new(
        current_subscription_id: impl Into<String>,
        new_subscription_id: impl Into<String>,
        product_reference_id: impl Into<String>,
    ) -> Self {
        Self {
            current_subscription_id: current_subscription_id.into(),
            new_subscription_id: new_subscription_id.into(),
            product_reference_id: product_reference_id.into(),
        }
    }
}
