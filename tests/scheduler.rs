mod common;

use chrono::Duration;
use common::{bid, build, scope, TestApp};
use dkp_auction::auction::model::ExternalRefs;
use dkp_auction::clock::SystemClock;
use dkp_auction::controller::{EngineSettings, StartAuction};
use dkp_auction::database::DatabaseManager;
use dkp_auction::notify::MemoryNotifier;
use dkp_auction::scheduler::RecoveryReport;
use std::sync::Arc;

fn refs(thread: &str) -> ExternalRefs {
    ExternalRefs {
        thread_ref: Some(thread.to_string()),
        announcement_ref: None,
    }
}

/// 마감이 지난 경매는 재시작 시 한 번만 정산되고, 마감 시각을 종료 시각으로 기록한다
#[tokio::test]
async fn test_recovery_settles_overdue_auction_once() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.fund("alice", 50).await;
    app.controller
        .place_bid(&scope(), bid(auction.id, "alice", 100))
        .await
        .unwrap();
    app.controller
        .attach_references(&scope(), auction.id, refs("t-1"))
        .await
        .unwrap();

    // 프로세스가 마감 전에 내려갔다가 두 시간 뒤에 올라옴
    app.controller.shutdown();
    app.clock.advance(Duration::hours(2));
    let restarted = app.restart();
    let report = restarted.controller.recover_on_startup().await.unwrap();
    assert_eq!(
        report,
        RecoveryReport {
            settled: 1,
            ..RecoveryReport::default()
        }
    );

    let history = restarted
        .controller
        .history(&scope(), Duration::days(1))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let record = &history[0];
    assert_eq!(record.auction_id, auction.id);
    assert_eq!(record.winner_id.as_deref(), Some("alice"));
    assert_eq!(record.winning_amount, 100);
    assert_eq!(record.closed_at, auction.end_time);
    assert_eq!(record.bids.len(), 1);
    assert_eq!(
        restarted.controller.balance(&scope(), "alice").await.unwrap(),
        40
    );

    // 정리 유예도 지났으므로 외부 핸들이 바로 정리된다
    assert_eq!(restarted.notifier.released(), vec![refs("t-1")]);
    let closed = restarted.controller.get(&scope(), auction.id).await.unwrap();
    assert!(closed.references().is_empty());

    // 다시 재시작해도 할 일이 없다
    let again = restarted.restart();
    let report = again.controller.recover_on_startup().await.unwrap();
    assert_eq!(report, RecoveryReport::default());
    assert_eq!(again.count("SELECT COUNT(*) FROM auction_history").await, 1);
    assert_eq!(
        again
            .count("SELECT COUNT(*) FROM ledger_transactions WHERE kind = 'debit'")
            .await,
        1
    );
}

#[tokio::test]
async fn test_recovery_rearms_future_deadlines() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;

    app.clock.advance(Duration::minutes(10));
    let restarted = app.restart();
    assert!(!restarted
        .controller
        .scheduler()
        .is_close_scheduled(auction.id));

    let report = restarted.controller.recover_on_startup().await.unwrap();
    assert_eq!(report.rearmed, 1);
    assert!(restarted
        .controller
        .scheduler()
        .is_close_scheduled(auction.id));
    assert!(restarted
        .controller
        .scheduler()
        .is_cleanup_scheduled(auction.id));
    assert!(restarted
        .controller
        .get(&scope(), auction.id)
        .await
        .unwrap()
        .is_open());
}

#[tokio::test]
async fn test_recovery_rearms_pending_cleanup() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    app.controller
        .attach_references(&scope(), auction.id, refs("t-2"))
        .await
        .unwrap();
    app.controller.end(&scope(), auction.id, true).await.unwrap();
    assert!(app.controller.scheduler().is_cleanup_scheduled(auction.id));

    // 유예(10분) 안에 재시작
    app.clock.advance(Duration::minutes(1));
    let restarted = app.restart();
    let report = restarted.controller.recover_on_startup().await.unwrap();
    assert_eq!(report.cleanup_rearmed, 1);
    assert_eq!(report.settled, 0);
    assert!(restarted
        .controller
        .scheduler()
        .is_cleanup_scheduled(auction.id));
    assert!(restarted.notifier.released().is_empty());

    // 유예가 지난 뒤 재시작하면 바로 정리한다
    restarted.clock.advance(Duration::minutes(20));
    let late = restarted.restart();
    let report = late.controller.recover_on_startup().await.unwrap();
    assert_eq!(report.cleaned, 1);
    assert_eq!(late.notifier.released(), vec![refs("t-2")]);
}

#[tokio::test]
async fn test_cancel_timers_is_idempotent() {
    let app = TestApp::new().await;
    let auction = app.start("helm", 1).await;
    let scheduler = app.controller.scheduler();

    scheduler.cancel(auction.id);
    scheduler.cancel(auction.id);
    assert!(!scheduler.is_close_scheduled(auction.id));
    assert!(!scheduler.is_cleanup_scheduled(auction.id));

    let stored = app.controller.get(&scope(), auction.id).await.unwrap();
    scheduler.schedule(&stored);
    scheduler.schedule(&stored);
    assert!(scheduler.is_close_scheduled(auction.id));
    assert_eq!(scheduler.pending_timers(), 2);
}

/// 실제 시계로 마감 타이머가 정산과 정리를 실행한다
#[tokio::test]
async fn test_live_timers_settle_and_clean_up() {
    common::init_tracing();
    let db = Arc::new(DatabaseManager::in_memory().await.unwrap());
    let notifier = Arc::new(MemoryNotifier::new());
    let controller = build(
        &db,
        Arc::new(SystemClock),
        &notifier,
        EngineSettings {
            cleanup_grace: Duration::milliseconds(300),
            ..EngineSettings::default()
        },
    );

    controller
        .adjust_points(&scope(), "alice", 50, "raid reward")
        .await
        .unwrap();
    let auction = controller
        .start(StartAuction {
            scope: scope(),
            item_id: "helm".to_string(),
            quantity: 1,
            duration: Some(Duration::milliseconds(500)),
        })
        .await
        .unwrap()
        .auction;
    controller
        .attach_references(&scope(), auction.id, refs("t-live"))
        .await
        .unwrap();
    controller
        .place_bid(&scope(), bid(auction.id, "alice", 100))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;

    let closed = controller.get(&scope(), auction.id).await.unwrap();
    assert!(!closed.is_open());
    assert!(closed.references().is_empty());
    assert!(!controller.scheduler().is_close_scheduled(auction.id));
    assert_eq!(controller.balance(&scope(), "alice").await.unwrap(), 40);
    assert_eq!(notifier.events_of("won").len(), 1);
    assert_eq!(notifier.released(), vec![refs("t-live")]);
    assert_eq!(controller.scheduler().pending_timers(), 0);
}

/// 마감이 지난 경매를 등록하면 여러 워커에서도 매번 정산된다
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overdue_schedule_always_settles() {
    let app = TestApp::new().await;
    let scheduler = Arc::clone(app.controller.scheduler());

    for round in 0..50 {
        let auction = app.start("helm", 1).await;
        scheduler.cancel(auction.id);
        app.clock.advance(Duration::hours(2));
        scheduler.schedule(&auction);

        let settled = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while app.controller.get(&scope(), auction.id).await.unwrap().is_open() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "round {} left auction {} open", round, auction.id);
        assert!(!scheduler.is_close_scheduled(auction.id));
    }
    assert_eq!(app.count("SELECT COUNT(*) FROM auction_history").await, 50);
}
