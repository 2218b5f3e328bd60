mod common;

use checkout_sdk::{
    ApiOperation, CancelSelection, CheckoutError, LifecycleState, ShippingCharge,
};
use common::*;

fn select(line_item_id: &str, cancel_price: u64, cancel_shipping: u64) -> CancelSelection {
    CancelSelection {
        line_item_id: line_item_id.to_string(),
        cancel_price,
        cancel_shipping,
    }
}

/// Pay for the two-item draft (PROD_001 at 1000+0, PROD_002 at 2000+500)
/// and return the paid session.
async fn paid_session() -> TestSession {
    let (_, _, mut session) = session("PG_B", instant_success());
    session
        .start_payment(&two_item_draft(), &card())
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn partial_cancel_removes_exhausted_items_and_decrements_the_rest() {
    let mut session = paid_session().await;

    // PROD_001 cancelled in full, PROD_002 cancelled 500 price + all shipping.
    let outcome = session
        .cancel_partial(
            &[select("PROD_001", 1_000, 0), select("PROD_002", 500, 500)],
            &[],
        )
        .await
        .unwrap();

    assert_eq!(outcome.cancel_amount, 2_000);
    assert_eq!(
        outcome.cancelled_item_ids,
        vec!["PROD_001".to_string(), "PROD_002".to_string()]
    );

    // PROD_001 hit zero on both amounts and is gone; PROD_002 stays with
    // what remains.
    let paid = session.paid_items();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].item.id, "PROD_002");
    assert_eq!(paid[0].remaining_price, 1_500);
    assert_eq!(paid[0].remaining_shipping, 0);

    // Partial cancellation never leaves Paid.
    assert_eq!(session.state(), LifecycleState::Paid);
    assert!(session.current_order().is_some());
}

#[tokio::test]
async fn repeated_partial_cancels_are_bounded_by_remaining_amounts() {
    let mut session = paid_session().await;

    session
        .cancel_partial(&[select("PROD_002", 1_500, 0)], &[])
        .await
        .unwrap();
    assert_eq!(session.paid_items()[1].remaining_price, 500);

    // A second cancel may only take what is left.
    let err = session
        .cancel_partial(&[select("PROD_002", 501, 0)], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));

    session
        .cancel_partial(&[select("PROD_002", 500, 500)], &[])
        .await
        .unwrap();
    assert_eq!(session.paid_items().len(), 1);
    assert_eq!(session.paid_items()[0].item.id, "PROD_001");
}

#[tokio::test]
async fn out_of_bound_selection_is_rejected_without_mutation() {
    let mut session = paid_session().await;
    let audit_before = session.audit().len();

    // First selection is valid; the second exceeds remaining shipping. The
    // whole batch must be rejected and nothing sent or applied.
    let err = session
        .cancel_partial(
            &[select("PROD_001", 1_000, 0), select("PROD_002", 0, 501)],
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
    assert!(err.to_string().contains("exceeds remaining shipping"));

    let paid = session.paid_items();
    assert_eq!(paid.len(), 2);
    assert_eq!(paid[0].remaining_price, 1_000);
    assert_eq!(paid[1].remaining_shipping, 500);
    assert_eq!(session.audit().len(), audit_before);
}

#[tokio::test]
async fn zero_amount_selection_is_rejected() {
    let mut session = paid_session().await;
    let err = session
        .cancel_partial(&[select("PROD_001", 0, 0)], &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("greater than zero"));
}

#[tokio::test]
async fn duplicate_selection_is_rejected() {
    let mut session = paid_session().await;
    let err = session
        .cancel_partial(
            &[select("PROD_001", 500, 0), select("PROD_001", 500, 0)],
            &[],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("more than once"));
}

#[tokio::test]
async fn unknown_item_selection_is_rejected() {
    let mut session = paid_session().await;
    let err = session
        .cancel_partial(&[select("PROD_999", 100, 0)], &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not part of the paid order"));
}

#[tokio::test]
async fn additional_shipping_charge_is_carried_in_the_request() {
    let mut session = paid_session().await;

    let charge = ShippingCharge {
        id: "SHIP_001".to_string(),
        name: "재배송비".to_string(),
        fee: 3_000,
        delivery_group: "A01".to_string(),
        seller_ref: "SELLER_01".to_string(),
    };
    let outcome = session
        .cancel_partial(&[select("PROD_001", 1_000, 0)], &[charge])
        .await
        .unwrap();

    assert_eq!(outcome.add_shipping_fee, 3_000);

    let entry = session.audit().entries().next().unwrap();
    assert_eq!(entry.operation, ApiOperation::CancelPartial);
    assert_eq!(entry.request["addShippingFee"], 3_000);
    assert_eq!(entry.request["addShippingProducts"][0]["id"], "SHIP_001");
}

#[tokio::test]
async fn zero_additional_shipping_fee_is_rejected() {
    let mut session = paid_session().await;
    let charge = ShippingCharge {
        id: "SHIP_001".to_string(),
        name: "재배송비".to_string(),
        fee: 0,
        delivery_group: "A01".to_string(),
        seller_ref: "SELLER_01".to_string(),
    };
    let err = session
        .cancel_partial(&[select("PROD_001", 500, 0)], &[charge])
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
}

#[tokio::test]
async fn full_cancel_requires_confirmation() {
    let mut session = paid_session().await;

    let err = session.cancel_all(false).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
    assert_eq!(session.state(), LifecycleState::Paid);
    assert_eq!(session.paid_items().len(), 2);
}

#[tokio::test]
async fn full_cancel_clears_the_order() {
    let mut session = paid_session().await;

    let receipt = session.cancel_all(true).await.unwrap();
    assert!(receipt.cancel_id.starts_with("CAN"));

    assert_eq!(session.state(), LifecycleState::Idle);
    assert!(session.current_order().is_none());
    assert!(session.paid_items().is_empty());

    let entry = session.audit().entries().next().unwrap();
    assert_eq!(entry.operation, ApiOperation::CancelAll);
    assert_eq!(entry.request["cancelAmount"], 3_500);
}

#[tokio::test]
async fn full_cancel_covers_only_the_remaining_amounts() {
    let mut session = paid_session().await;

    session
        .cancel_partial(&[select("PROD_002", 500, 500)], &[])
        .await
        .unwrap();
    session.cancel_all(true).await.unwrap();

    let entry = session.audit().entries().next().unwrap();
    assert_eq!(entry.operation, ApiOperation::CancelAll);
    // 1000 (PROD_001) + 1500 (what was left of PROD_002).
    assert_eq!(entry.request["cancelAmount"], 2_500);
}

#[tokio::test]
async fn fully_partially_cancelled_order_stays_paid_until_cancel_all() {
    let mut session = paid_session().await;

    session
        .cancel_partial(
            &[select("PROD_001", 1_000, 0), select("PROD_002", 2_000, 500)],
            &[],
        )
        .await
        .unwrap();

    assert!(session.paid_items().is_empty());
    assert_eq!(session.state(), LifecycleState::Paid);

    session.cancel_all(true).await.unwrap();
    assert_eq!(session.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn cancellation_requires_a_paid_order() {
    let (_, _, mut session) = session("PG_B", instant_success());

    let err = session.cancel_all(true).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidState(_)));

    let err = session
        .cancel_partial(&[select("PROD_001", 100, 0)], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InvalidState(_)));
}

#[tokio::test]
async fn backend_rejected_cancel_leaves_the_paid_set_untouched() {
    let (backend, _, mut session) = session("PG_B", instant_success());
    session
        .start_payment(&two_item_draft(), &card())
        .await
        .unwrap();

    backend.reject_next(ApiOperation::CancelPartial, "3003", "already settled");
    let err = session
        .cancel_partial(&[select("PROD_001", 1_000, 0)], &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::BackendRejected {
            operation: ApiOperation::CancelPartial,
            ..
        }
    ));

    // Rejected server-side: recorded in the audit, but nothing applied.
    assert_eq!(session.paid_items().len(), 2);
    assert_eq!(session.paid_items()[0].remaining_price, 1_000);
    assert_eq!(session.state(), LifecycleState::Paid);

    backend.reject_next(ApiOperation::CancelAll, "3003", "already settled");
    let err = session.cancel_all(true).await.unwrap_err();
    assert!(matches!(err, CheckoutError::BackendRejected { .. }));
    assert_eq!(session.state(), LifecycleState::Paid);
    assert!(session.current_order().is_some());
}
