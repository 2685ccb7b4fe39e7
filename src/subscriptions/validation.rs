//! Field-level validation results.
//!
//! Every processor runs an ordered battery of checks and collects failures
//! into a [`ValidationErrors`] map before deciding whether to mutate. The map
//! serializes as `{field: [reason, ...]}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request field names used as keys in [`ValidationErrors`].
pub mod fields {
    pub const PARTNER_ID: &str = "partner_id";
    pub const MEMBER_ID: &str = "member_id";
    pub const SUBSCRIPTION_ID: &str = "subscription_id";
    pub const PAYMENT_GATEWAY_ID: &str = "payment_gateway_id";
    pub const CUSTOM_NAME: &str = "custom_name";
    pub const CURRENT_SUBSCRIPTION_ID: &str = "current_subscription_id";
    pub const NEW_SUBSCRIPTION_ID: &str = "new_subscription_id";
    pub const PRODUCT_REFERENCE_ID: &str = "product_reference_id";
}

/// Machine-readable reason attached to a failing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "inactive")]
    Inactive,
    #[serde(rename = "auth_failed")]
    AuthFailed,
    #[serde(rename = "required")]
    Required,
    #[serde(rename = "not_endorsed")]
    NotEndorsed,
    #[serde(rename = "payin_not_supported")]
    PayinNotSupported,
    #[serde(rename = "already_consumed")]
    AlreadyConsumed,
    #[serde(rename = "already_subscribed")]
    AlreadySubscribed,
    #[serde(rename = "limit_exceeded")]
    LimitExceeded,
    #[serde(rename = "too_long")]
    TooLong,
    #[serde(rename = "in_warning")]
    InWarning,
    #[serde(rename = "expired")]
    Expired,
    #[serde(rename = "invalid_status")]
    InvalidStatus,
    #[serde(rename = "free_plan")]
    FreePlan,
    #[serde(rename = "notenabled")]
    NotEnabled,
    #[serde(rename = "live_products")]
    LiveProducts,
    #[serde(rename = "already_exists")]
    AlreadyExists,
    #[serde(rename = "not_active")]
    NotActive,
    #[serde(rename = "not_allowed")]
    NotAllowed,
}

impl ReasonCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Inactive => "inactive",
            Self::AuthFailed => "auth_failed",
            Self::Required => "required",
            Self::NotEndorsed => "not_endorsed",
            Self::PayinNotSupported => "payin_not_supported",
            Self::AlreadyConsumed => "already_consumed",
            Self::AlreadySubscribed => "already_subscribed",
            Self::LimitExceeded => "limit_exceeded",
            Self::TooLong => "too_long",
            Self::InWarning => "in_warning",
            Self::Expired => "expired",
            Self::InvalidStatus => "invalid_status",
            Self::FreePlan => "free_plan",
            Self::NotEnabled => "notenabled",
            Self::LiveProducts => "live_products",
            Self::AlreadyExists => "already_exists",
            Self::NotActive => "not_active",
            Self::NotAllowed => "not_allowed",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated field-level validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<ReasonCode>>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason` against `field`. Duplicate reasons are kept once.
    pub fn add(&mut self, field: &str, reason: ReasonCode) {
        let reasons = self.errors.entry(field.to_string()).or_default();
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether `field` has any recorded failure.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[ReasonCode]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, field: &str, reason: ReasonCode) -> bool {
        self.get(field).is_some_and(|reasons| reasons.contains(&reason))
    }

    /// Number of fields with failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ReasonCode])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Fold another set of failures into this one.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, reasons) in other.errors {
            for reason in reasons {
                self.add(&field, reason);
            }
        }
    }

    /// `Ok(())` when clean, otherwise the accumulated failures.
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.has_errors() { Err(self) } else { Ok(()) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, reasons) in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}:", field)?;
            for (i, reason) in reasons.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                write!(f, "{}{}", sep, reason)?;
            }
        }
        Ok(())
    }
}

/// Result of a lifecycle operation that passed infrastructure checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Validation passed and the mutation committed.
    Accepted(T),
    /// Validation failed; nothing was written.
    Rejected(ValidationErrors),
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The accepted value, if any.
    pub fn accepted(self) -> Option<T> {
        match self {
            Self::Accepted(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// The validation failures, if any.
    pub fn rejected(self) -> Option<ValidationErrors> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(errors) => Some(errors),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Accepted(value) => Outcome::Accepted(f(value)),
            Self::Rejected(errors) => Outcome::Rejected(errors),
        }
    }
}

/// Check an optional custom subscription name against `max_length`
/// characters. Blank names count as absent.
pub fn validate_custom_name(
    name: Option<&str>,
    max_length: usize,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let name = name.map(str::trim).filter(|n| !n.is_empty())?;
    if name.chars().count() > max_length {
        errors.add(fields::CUSTOM_NAME, ReasonCode::TooLong);
        return None;
    }
    Some(name.to_string())
}

/// Gateway identifiers at or below zero are treated as absent.
#[must_use]
pub fn normalize_gateway_id(id: Option<i64>) -> Option<i64> {
    id.filter(|id| *id > 0)
}
