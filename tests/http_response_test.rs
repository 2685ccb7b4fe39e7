//! Status codes and body shapes returned to HTTP handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{TimeZone, Utc};
use memberflow::subscriptions::{
    CheckoutRequest, FixedClock, InMemoryMembershipStore, MemberIdentity, OperationResponse, PaymentGateway,
    StaticPaymentDetails, SubscriptionPlan, SubscriptionService,
};
use serde_json::Value;

fn service() -> (
    Arc<InMemoryMembershipStore>,
    SubscriptionService<InMemoryMembershipStore, InMemoryMembershipStore, StaticPaymentDetails>,
) {
    let store = Arc::new(InMemoryMembershipStore::new());
    store.seed_member("m1", "partner-a");
    store.seed_gateway(PaymentGateway {
        id: 1,
        name: "card".to_string(),
        is_active: true,
    });
    store.seed_partner_gateway("partner-a", 1, r#"{"payin": true}"#);
    store.seed_plans(vec![SubscriptionPlan::new("pro", 4)]);

    let service = SubscriptionService::builder(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::new(StaticPaymentDetails),
    )
    .clock(Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap())))
    .build();

    (store, service)
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_accepted_checkout_is_created() {
    let (_, service) = service();
    let result = service
        .checkout(
            &MemberIdentity::new("m1", "partner-a"),
            &CheckoutRequest::new("pro").with_payment_gateway(1).with_custom_name("  Label  "),
        )
        .await;

    let response = OperationResponse::created(result).into_response();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["plan_id"], "pro");
    assert_eq!(body["status"], "active");
    assert_eq!(body["custom_name"], "Label");
}

#[tokio::test]
async fn test_rejection_body_lists_reasons_per_field() {
    let (_, service) = service();
    let result = service
        .checkout(&MemberIdentity::new("m1", "partner-b"), &CheckoutRequest::new("pro"))
        .await;

    let response = OperationResponse::created(result).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["errors"]["partner_id"], serde_json::json!(["auth_failed"]));
}

#[tokio::test]
async fn test_gateway_reasons_in_body() {
    let (store, service) = service();
    store.seed_partner_gateway("partner-a", 1, r#"{"payin": false}"#);

    let result = service
        .checkout(
            &MemberIdentity::new("m1", "partner-a"),
            &CheckoutRequest::new("pro").with_payment_gateway(1),
        )
        .await;

    let body = body_json(OperationResponse::created(result).into_response()).await;
    assert_eq!(body["errors"]["payment_gateway_id"], serde_json::json!(["payin_not_supported"]));
}

#[tokio::test]
async fn test_infrastructure_failure_hides_details() {
    let (store, service) = service();
    store.set_fail_inserts(true);

    let result = service
        .checkout(
            &MemberIdentity::new("m1", "partner-a"),
            &CheckoutRequest::new("pro").with_payment_gateway(1),
        )
        .await;

    let response = OperationResponse::created(result).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
    assert!(body["error_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_unknown_plan_lookup_is_not_found() {
    let (_, service) = service();
    let err = service.plan("missing").await.unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}
