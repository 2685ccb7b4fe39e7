//! Subscription-specific error types.
//!
//! These cover failures outside the validation battery: lookups of
//! identifiers that are not caller input, store inconsistencies, and lost
//! write races. Validation failures are reported through
//! [`ValidationErrors`](super::ValidationErrors) instead.

use std::fmt;

/// Subscription engine errors.
///
/// Converted to [`MemberflowError`](crate::error::MemberflowError) at the
/// processor boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The plan does not exist in the catalog.
    PlanNotFound { plan_id: String },
    /// The member subscription does not exist.
    SubscriptionNotFound { subscription_id: String },
    /// The caller's member record does not exist.
    MemberNotFound { member_id: String },
    /// The caller's partner is not the member's partner.
    PartnerMismatch { member_id: String },
    /// A stored subscription points at a plan the catalog no longer has.
    DanglingPlan {
        subscription_id: String,
        plan_id: String,
    },
    /// The subscription insert reported no affected rows.
    InsertionFailed { member_id: String },
    /// A guarded update matched no rows.
    ConcurrentModification { subscription_id: String },
    /// Listing query parameters are out of range.
    InvalidListingQuery { message: String },
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanNotFound { plan_id } => write!(f, "Plan not found: {}", plan_id),
            Self::SubscriptionNotFound { subscription_id } => {
                write!(f, "Member subscription not found: {}", subscription_id)
            }
            Self::DanglingPlan {
                subscription_id,
                plan_id,
            } => write!(
                f,
                "Subscription '{}' references missing plan '{}'",
                subscription_id, plan_id
            ),
            Self::MemberNotFound { member_id } => write!(f, "Member not found: {}", member_id),
            Self::PartnerMismatch { member_id } => {
                write!(f, "Partner not authorized for member '{}'", member_id)
            }
            Self::InsertionFailed { member_id } => {
                write!(f, "insertion failed for member '{}'", member_id)
            }
            Self::ConcurrentModification { subscription_id } => write!(
                f,
                "Concurrent modification detected for '{}', please retry",
                subscription_id
            ),
            Self::InvalidListingQuery { message } => {
                write!(f, "Invalid listing query: {}", message)
            }
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<SubscriptionError> for crate::error::MemberflowError {
    fn from(err: SubscriptionError) -> Self {
        match &err {
            SubscriptionError::PlanNotFound { .. }
            | SubscriptionError::SubscriptionNotFound { .. }
            | SubscriptionError::MemberNotFound { .. } => {
                crate::error::MemberflowError::NotFound(err.to_string())
            }
            SubscriptionError::InvalidListingQuery { .. } => {
                crate::error::MemberflowError::BadRequest(err.to_string())
            }
            SubscriptionError::PartnerMismatch { .. } => {
                crate::error::MemberflowError::Forbidden(err.to_string())
            }
            SubscriptionError::ConcurrentModification { .. } => {
                crate::error::MemberflowError::ConcurrentModification(err.to_string())
            }
            SubscriptionError::DanglingPlan { .. } | SubscriptionError::InsertionFailed { .. } => {
                crate::error::MemberflowError::Internal(err.to_string())
            }
        }
    }
}

impl SubscriptionError {
    /// Check if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::DanglingPlan { .. } | Self::InsertionFailed { .. } | Self::ConcurrentModification { .. }
        )
    }
}
