//! Audit logging for subscription lifecycle operations.
//!
//! Processors emit one event after each committed transition and one for
//! each rejected request.

use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;

use super::types::SubscriptionStatus;

/// Audit event types for lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionAuditEvent {
    /// Subscription created by checkout.
    CheckoutCompleted {
        member_id: String,
        subscription_id: String,
        plan_id: String,
        expiration_date: DateTime<Utc>,
        payout_linked: bool,
    },
    /// Expiration extended.
    SubscriptionRenewed {
        member_id: String,
        subscription_id: String,
        previous_status: SubscriptionStatus,
        previous_expiration: DateTime<Utc>,
        new_expiration: DateTime<Utc>,
        payment_gateway_id: i64,
    },
    /// Subscription moved to cancelled.
    SubscriptionCancelled {
        member_id: String,
        subscription_id: String,
        previous_status: SubscriptionStatus,
    },
    /// Product moved between subscriptions.
    ProductMigrated {
        member_id: String,
        product_id: String,
        from_subscription_id: String,
        to_subscription_id: String,
    },
    /// Validation rejected a request.
    OperationRejected {
        member_id: String,
        operation: &'static str,
        reasons: String,
    },
}

impl fmt::Display for SubscriptionAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckoutCompleted { member_id, subscription_id, plan_id, expiration_date, payout_linked } => {
                write!(
                    f,
                    "Checkout completed: member={}, sub={}, plan={}, expires={}, payout_linked={}",
                    member_id, subscription_id, plan_id, expiration_date, payout_linked
                )
            }
            Self::SubscriptionRenewed {
                member_id,
                subscription_id,
                previous_status,
                previous_expiration,
                new_expiration,
                payment_gateway_id,
            } => {
                write!(
                    f,
                    "Subscription renewed: member={}, sub={}, from={}, expires={} -> {}, gateway={}",
                    member_id, subscription_id, previous_status, previous_expiration, new_expiration, payment_gateway_id
                )
            }
            Self::SubscriptionCancelled { member_id, subscription_id, previous_status } => {
                write!(f, "Subscription cancelled: member={}, sub={}, from={}", member_id, subscription_id, previous_status)
            }
            Self::ProductMigrated { member_id, product_id, from_subscription_id, to_subscription_id } => {
                write!(
                    f,
                    "Product migrated: member={}, product={}, {} -> {}",
                    member_id, product_id, from_subscription_id, to_subscription_id
                )
            }
            Self::OperationRejected { member_id, operation, reasons } => {
                write!(f, "Operation rejected: member={}, op={}, reasons=[{}]", member_id, operation, reasons)
            }
        }
    }
}

impl SubscriptionAuditEvent {
    /// Event kind for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted { .. } => "checkout_completed",
            Self::SubscriptionRenewed { .. } => "subscription_renewed",
            Self::SubscriptionCancelled { .. } => "subscription_cancelled",
            Self::ProductMigrated { .. } => "product_migrated",
            Self::OperationRejected { .. } => "operation_rejected",
        }
    }
}

/// Trait for audit logging backends.
///
/// Implementations should swallow their own failures; an audit write never
/// fails the operation that produced it.
pub trait SubscriptionAuditLogger: Send + Sync {
    fn log(&self, event: SubscriptionAuditEvent) -> impl Future<Output = ()> + Send;
}

/// No-op audit logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

impl SubscriptionAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: SubscriptionAuditEvent) {}
}

/// Tracing-based audit logger.
///
/// Logs audit events at INFO level under the `memberflow::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl SubscriptionAuditLogger for TracingAuditLogger {
    async fn log(&self, event: SubscriptionAuditEvent) {
        tracing::info!(
            target: "memberflow::audit",
            event_type = %event.kind(),
            "{}", event
        );
    }
}

/// Audit logger that keeps every event in memory.
#[cfg(any(test, feature = "test-membership"))]
#[derive(Debug, Clone, Default)]
pub struct RecordingAuditLogger {
    events: std::sync::Arc<tokio::sync::Mutex<Vec<SubscriptionAuditEvent>>>,
}

#[cfg(any(test, feature = "test-membership"))]
impl RecordingAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<SubscriptionAuditEvent> {
        self.events.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-membership"))]
impl SubscriptionAuditLogger for RecordingAuditLogger {
    async fn log(&self, event: SubscriptionAuditEvent) {
        self.events.lock().await.push(event);
    }
}

/// Log a rejected request at debug level and record it in the audit trail.
pub(crate) async fn record_rejection<A: SubscriptionAuditLogger>(
    audit: &A,
    member_id: &str,
    operation: &'static str,
    errors: &super::validation::ValidationErrors,
) {
    tracing::debug!(member_id = %member_id, operation, errors = %errors, "request rejected");
    audit
        .log(SubscriptionAuditEvent::OperationRejected {
            member_id: member_id.to_string(),
            operation,
            reasons: errors.to_string(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled() -> SubscriptionAuditEvent {
        SubscriptionAuditEvent::SubscriptionCancelled {
            member_id: "m1".to_string(),
            subscription_id: "ms_1".to_string(),
            previous_status: SubscriptionStatus::OnHold,
        }
    }

    #[tokio::test]
    async fn test_noop_logger() {
        NoOpAuditLogger.log(cancelled()).await;
    }

    #[tokio::test]
    async fn test_recording_logger() {
        let logger = RecordingAuditLogger::new();
        logger.log(cancelled()).await;
        logger
            .log(SubscriptionAuditEvent::OperationRejected {
                member_id: "m1".to_string(),
                operation: "renewal",
                reasons: "subscription_id: in_warning".to_string(),
            })
            .await;

        let events = logger.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SubscriptionAuditEvent::SubscriptionCancelled { .. }));
        assert_eq!(events[1].kind(), "operation_rejected");
    }

    #[test]
    fn test_event_display() {
        let display = cancelled().to_string();
        assert_eq!(display, "Subscription cancelled: member=m1, sub=ms_1, from=on_hold");
    }
}
