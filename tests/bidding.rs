mod common;

use chrono::Duration;
use common::{bid, scope, TestApp};
use dkp_auction::error::AuctionError;
use std::sync::Arc;

/// 카테고리 {10, 100, 10}, 수량 2 → 시작가 200, 필요 DKP 20, 다음 입찰 +20
#[tokio::test]
async fn test_pricing_for_quantity_two() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 2).await;
    assert_eq!(auction.starting_price, 200);
    assert_eq!(auction.required_dkp(), 20);

    app.fund("alice", 100).await;
    app.fund("bob", 100).await;

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", 190))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuctionError::BidTooLow {
            minimum: 200,
            offered: 190
        }
    ));

    let receipt = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", 200))
        .await
        .unwrap();
    assert_eq!(receipt.next_minimum, 220);
    assert!(receipt.outbid_user.is_none());

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "bob", 210))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::BidTooLow { minimum: 220, .. }));

    let receipt = app
        .controller
        .place_bid(&scope(), bid(auction.id, "bob", 220))
        .await
        .unwrap();
    assert_eq!(receipt.outbid_user.as_deref(), Some("alice"));
    assert_eq!(receipt.next_minimum, 240);
    assert_eq!(app.notifier.events_of("outbid").len(), 1);
}

/// 잔액 25, A(20) 선두 중 B(10) 입찰 → 잔액 부족
#[tokio::test]
async fn test_insufficient_funds_counts_leading_auctions() {
    let app = TestApp::new().await;
    let a = app.start("helm", 2).await;
    let b = app.start("ring", 1).await;
    app.fund("alice", 25).await;

    app.controller
        .place_bid(&scope(), bid(a.id, "alice", 200))
        .await
        .unwrap();
    assert_eq!(app.controller.risk_for_user(&scope(), "alice").await.unwrap(), 20);

    let err = app
        .controller
        .place_bid(&scope(), bid(b.id, "alice", 100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuctionError::InsufficientFunds {
            balance: 25,
            required: 30
        }
    ));
}

#[tokio::test]
async fn test_outbid_user_releases_risk() {
    let app = TestApp::new().await;
    let a = app.start("helm", 2).await;
    let b = app.start("ring", 1).await;
    app.fund("alice", 25).await;
    app.fund("bob", 100).await;

    app.controller
        .place_bid(&scope(), bid(a.id, "alice", 200))
        .await
        .unwrap();
    app.controller
        .place_bid(&scope(), bid(a.id, "bob", 220))
        .await
        .unwrap();

    // alice 는 더 이상 A 의 선두가 아니므로 B 에 입찰할 수 있다
    assert_eq!(app.controller.risk_for_user(&scope(), "alice").await.unwrap(), 0);
    app.controller
        .place_bid(&scope(), bid(b.id, "alice", 100))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_raising_own_bid_is_not_an_outbid() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.fund("alice", 50).await;

    app.controller
        .place_bid(&scope(), bid(auction.id, "alice", 100))
        .await
        .unwrap();
    let receipt = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", 110))
        .await
        .unwrap();

    assert!(receipt.outbid_user.is_none());
    assert!(app.notifier.events_of("outbid").is_empty());
    // 본인 경매는 위험 DKP 에서 제외되므로 재입찰도 잔액 10 이면 충분하다
    assert_eq!(app.controller.risk_for_user(&scope(), "alice").await.unwrap(), 10);
}

#[tokio::test]
async fn test_bid_rejections() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.fund("alice", 50).await;

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id + 100, "alice", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NotFound(_)));

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", -1))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::InvalidInput(_)));

    // 다른 범위에서는 보이지 않는다
    let other = dkp_auction::auction::model::Scope::new("guild-2", "lineage");
    let err = app
        .controller
        .place_bid(&other, bid(auction.id, "alice", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NotFound(_)));

    app.clock.advance(Duration::hours(2));
    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::AuctionClosed(id) if id == auction.id));
}

#[tokio::test]
async fn test_user_without_account_cannot_bid() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "nobody", 100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuctionError::InsufficientFunds {
            balance: 0,
            required: 10
        }
    ));
}

/// 동시 입찰에서도 잔액 ≥ 위험 DKP 가 유지된다
#[tokio::test]
async fn test_concurrent_bids_never_exceed_balance() {
    let app = TestApp::new().await;
    let mut auctions = Vec::new();
    for i in 0..5 {
        auctions.push(app.start(&format!("item-{}", i), 2).await);
    }
    app.fund("alice", 50).await;
    app.fund("bob", 45).await;

    let controller = Arc::clone(&app.controller);
    let mut handles = Vec::new();
    for auction in &auctions {
        for (user, amount) in [("alice", 200), ("bob", 220)] {
            let controller = Arc::clone(&controller);
            let cmd = bid(auction.id, user, amount);
            handles.push(tokio::spawn(async move {
                controller.place_bid(&scope(), cmd).await
            }));
        }
    }

    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => {}
            Err(AuctionError::InsufficientFunds { .. }) | Err(AuctionError::BidTooLow { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    for (user, balance) in [("alice", 50), ("bob", 45)] {
        let risk = controller.risk_for_user(&scope(), user).await.unwrap();
        assert!(risk <= balance, "{} risk {} > balance {}", user, risk, balance);
    }

    let accepted = app.count("SELECT COUNT(*) FROM bids").await;
    assert!(accepted >= 2);
}

/// i64 끝자락 금액: 다음 최소 입찰가를 표현할 수 없는 입찰은 거절되고, 경매는 계속 입찰을 받는다
#[tokio::test]
async fn test_bid_amounts_near_i64_max() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.fund("alice", 50).await;
    app.fund("bob", 50).await;

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::InvalidInput(_)));

    let largest = i64::MAX - auction.bid_step();
    let receipt = app
        .controller
        .place_bid(&scope(), bid(auction.id, "alice", largest))
        .await
        .unwrap();
    assert_eq!(receipt.next_minimum, i64::MAX);

    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "bob", 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuctionError::BidTooLow {
            minimum: i64::MAX,
            offered: 5
        }
    ));
    let err = app
        .controller
        .place_bid(&scope(), bid(auction.id, "bob", i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::InvalidInput(_)));

    let snapshot = app.controller.snapshot(&scope(), auction.id).await.unwrap();
    assert_eq!(snapshot.minimum_bid, i64::MAX);
    assert_eq!(snapshot.bids.len(), 1);
}
