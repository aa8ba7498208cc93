mod common;

use chrono::Duration;
use common::{scope, TestApp};
use dkp_auction::clock::Clock;
use dkp_auction::error::AuctionError;

/// 종료 처리는 한 번만 적용되고, 다시 호출하면 기존 기록을 그대로 돌려준다
#[tokio::test]
async fn test_mark_closed_is_idempotent() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.controller.scheduler().cancel(auction.id);
    let store = app.controller.store();

    let first_close = app.clock.now() + Duration::minutes(5);
    let closed = store
        .mark_closed(&scope(), auction.id, first_close)
        .await
        .unwrap();
    assert!(!closed.is_open());
    assert_eq!(closed.closed_at, Some(first_close));
    assert_eq!(closed.end_time, first_close);
    assert!(store.find_open(&scope()).await.unwrap().is_empty());

    let again = store
        .mark_closed(&scope(), auction.id, first_close + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(again, closed);

    // 종료된 경매는 수정/삭제 대상이 아니다
    let err = store
        .update_quantity_and_deadline(&scope(), auction.id, Some(2), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NotFound(_)));
    let err = store.delete(&scope(), auction.id).await.unwrap_err();
    assert!(matches!(err, AuctionError::NotFound(_)));

    let err = store
        .mark_closed(&scope(), auction.id + 100, first_close)
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NotFound(_)));
}
