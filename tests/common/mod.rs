#![allow(dead_code)]

use chrono::{Duration, TimeZone, Utc};
use dkp_auction::auction::model::{Auction, Scope};
use dkp_auction::bidding::model::PlaceBidCommand;
use dkp_auction::catalog::{CatalogItem, Category, GameDefaults, StaticCatalog};
use dkp_auction::clock::{Clock, ManualClock};
use dkp_auction::controller::{AuctionController, EngineSettings, StartAuction};
use dkp_auction::database::DatabaseManager;
use dkp_auction::notify::MemoryNotifier;
use std::sync::Arc;

pub const GUILD: &str = "guild-1";
pub const GAME: &str = "lineage";

/// 트레이싱 초기화 (여러 테스트에서 호출해도 된다)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub fn scope() -> Scope {
    Scope::new(GUILD, GAME)
}

/// 카테고리 {최소 DKP 10, 최소 통화 100, 증가폭 10}
pub fn armor() -> Category {
    Category {
        name: "Armor".to_string(),
        minimum_dkp: 10,
        minimum_currency: 100,
        bid_increment: 10,
    }
}

pub fn catalog() -> StaticCatalog {
    let mut catalog = StaticCatalog::new();
    let scope = scope();
    catalog.set_defaults(
        &scope,
        GameDefaults {
            auction_duration: Duration::hours(1),
            currency_name: "Adena".to_string(),
        },
    );
    for (id, name) in [
        ("helm", "Helm of Valor"),
        ("ring", "Ring of Haste"),
        ("item-0", "Relic 0"),
        ("item-1", "Relic 1"),
        ("item-2", "Relic 2"),
        ("item-3", "Relic 3"),
        ("item-4", "Relic 4"),
    ] {
        catalog.insert_item(
            &scope,
            CatalogItem {
                id: id.to_string(),
                name: name.to_string(),
                category: armor(),
            },
        );
    }
    catalog
}

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub struct TestApp {
    pub db: Arc<DatabaseManager>,
    pub clock: ManualClock,
    pub notifier: Arc<MemoryNotifier>,
    pub controller: Arc<AuctionController>,
    pub settings: EngineSettings,
}

impl TestApp {
    /// 인메모리 DB + 수동 시계로 앱 구성
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings::default()).await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        init_tracing();
        let db = Arc::new(DatabaseManager::in_memory().await.unwrap());
        let clock = ManualClock::new(start_time());
        let notifier = Arc::new(MemoryNotifier::new());
        let controller = build(&db, Arc::new(clock.clone()), &notifier, settings.clone());
        Self {
            db,
            clock,
            notifier,
            controller,
            settings,
        }
    }

    /// 같은 DB 위에 새 컨트롤러를 만든다 (프로세스 재시작 흉내)
    pub fn restart(&self) -> Self {
        self.controller.shutdown();
        let controller = build(
            &self.db,
            Arc::new(self.clock.clone()),
            &self.notifier,
            self.settings.clone(),
        );
        Self {
            db: Arc::clone(&self.db),
            clock: self.clock.clone(),
            notifier: Arc::clone(&self.notifier),
            controller,
            settings: self.settings.clone(),
        }
    }

    pub async fn start(&self, item_id: &str, quantity: i64) -> Auction {
        self.controller
            .start(StartAuction {
                scope: scope(),
                item_id: item_id.to_string(),
                quantity,
                duration: None,
            })
            .await
            .unwrap()
            .auction
    }

    pub async fn fund(&self, user_id: &str, amount: i64) {
        self.controller
            .adjust_points(&scope(), user_id, amount, "raid reward")
            .await
            .unwrap();
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
    }
}

pub fn build(
    db: &Arc<DatabaseManager>,
    clock: Arc<dyn Clock>,
    notifier: &Arc<MemoryNotifier>,
    settings: EngineSettings,
) -> Arc<AuctionController> {
    let catalog = Arc::new(catalog());
    Arc::new(AuctionController::new(
        Arc::clone(db),
        catalog.clone(),
        catalog,
        notifier.clone(),
        clock,
        settings,
    ))
}

pub fn bid(auction_id: i64, bidder_id: &str, amount: i64) -> PlaceBidCommand {
    PlaceBidCommand {
        auction_id,
        bidder_id: bidder_id.to_string(),
        amount,
    }
}
