/// 경매 컨트롤러
/// 명령 계층이 호출하는 유일한 진입점. 저장소를 바꾸고 스케줄러로 타이머를 관리한다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionHistoryRecord, AuctionId, ExternalRefs, NewAuction, Scope};
use crate::bidding::commands::BidService;
use crate::bidding::model::{Bid, BidReceipt, PlaceBidCommand};
use crate::catalog::{GameSettings, ItemCatalog};
use crate::clock::Clock;
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::{AuctionError, AuctionResult};
use crate::ledger::{BalanceChange, Ledger, LedgerTransaction, PointAdjustment};
use crate::locks::ScopeLocks;
use crate::notify::{announce_best_effort, release_best_effort, Notifier};
use crate::scheduler::{AuctionScheduler, RecoveryReport};
use crate::settlement::{CloseOutcome, SettlementEngine};
use crate::store::AuctionStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Requests / Outcomes
/// 엔진 동작 설정
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cleanup_grace: Duration,
    pub confirm_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            cleanup_grace: config.cleanup_grace,
            confirm_timeout: config.confirm_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartAuction {
    pub scope: Scope,
    pub item_id: String,
    pub quantity: i64,
    /// 없으면 게임 기본 경매 시간
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedAuction {
    pub auction: Auction,
    pub announcement: AuctionEvent,
}

#[derive(Debug, Clone, Default)]
pub struct EditAuction {
    pub quantity: Option<i64>,
    /// 현재 마감 시각에 더할 시간 (음수면 단축)
    pub duration_delta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum EndOutcome {
    /// 종료 타이머가 살아 있어 확인이 필요함
    ConfirmationRequired(Auction),
    Closed(CloseOutcome),
}

#[derive(Debug, Clone)]
pub enum ConfirmedEnd {
    Closed(CloseOutcome),
    Declined,
    TimedOut,
}

/// 수동 종료 확인 요청 (시간 초과는 거절로 본다)
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, auction: &Auction) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction: Auction,
    pub bids: Vec<Bid>,
    pub minimum_bid: i64,
    pub close_scheduled: bool,
}
// endregion: --- Requests / Outcomes

// region:    --- Auction Controller
pub struct AuctionController {
    store: Arc<AuctionStore>,
    ledger: Arc<Ledger>,
    bids: BidService,
    scheduler: Arc<AuctionScheduler>,
    catalog: Arc<dyn ItemCatalog>,
    settings: Arc<dyn GameSettings>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<ScopeLocks>,
    clock: Arc<dyn Clock>,
    confirm_timeout: std::time::Duration,
}

impl AuctionController {
    /// 구성 요소를 모두 연결해 컨트롤러 생성
    pub fn new(
        db: Arc<DatabaseManager>,
        catalog: Arc<dyn ItemCatalog>,
        settings: Arc<dyn GameSettings>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        engine_settings: EngineSettings,
    ) -> Self {
        let locks = Arc::new(ScopeLocks::new());
        let store = Arc::new(AuctionStore::new(Arc::clone(&db)));
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&db),
            Arc::clone(&locks),
            Arc::clone(&clock),
        ));
        let bids = BidService::new(
            Arc::clone(&db),
            Arc::clone(&ledger),
            Arc::clone(&locks),
            Arc::clone(&clock),
        );
        let engine = Arc::new(SettlementEngine::new(
            Arc::clone(&db),
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&notifier),
            Arc::clone(&locks),
            Arc::clone(&clock),
        ));
        let scheduler = AuctionScheduler::new(
            Arc::clone(&store),
            engine,
            Arc::clone(&notifier),
            Arc::clone(&clock),
            engine_settings.cleanup_grace,
        );
        let confirm_timeout = engine_settings
            .confirm_timeout
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        Self {
            store,
            ledger,
            bids,
            scheduler,
            catalog,
            settings,
            notifier,
            locks,
            clock,
            confirm_timeout,
        }
    }

    pub fn store(&self) -> &Arc<AuctionStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn scheduler(&self) -> &Arc<AuctionScheduler> {
        &self.scheduler
    }

    /// 재시작 복구
    pub async fn recover_on_startup(&self) -> AuctionResult<RecoveryReport> {
        self.scheduler.recover_on_startup().await
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    // -- Lifecycle

    /// 경매 시작
    pub async fn start(&self, request: StartAuction) -> AuctionResult<StartedAuction> {
        info!(
            "{:<12} --> 경매 시작 요청: scope={}, item={}, 수량={}",
            "Controller", request.scope, request.item_id, request.quantity
        );
        if request.quantity < 1 {
            return Err(AuctionError::InvalidInput(
                "수량은 1 이상이어야 합니다.".to_string(),
            ));
        }
        let scope = request.scope;
        let item = self
            .catalog
            .get_item(&scope, &request.item_id)
            .await
            .ok_or_else(|| AuctionError::NotFound(format!("item {}", request.item_id)))?;
        let defaults = self.settings.defaults(&scope).await;
        let duration = request.duration.unwrap_or(defaults.auction_duration);
        if duration <= Duration::zero() {
            return Err(AuctionError::InvalidInput(
                "경매 시간은 0 보다 커야 합니다.".to_string(),
            ));
        }

        let now = self.clock.now();
        let end_time = now
            .checked_add_signed(duration)
            .ok_or_else(|| AuctionError::InvalidInput("경매 시간이 너무 깁니다.".to_string()))?;
        let auction = self
            .store
            .create(NewAuction {
                scope: scope.clone(),
                item_id: item.id,
                item_name: item.name,
                category_name: item.category.name,
                quantity: request.quantity,
                minimum_dkp: item.category.minimum_dkp,
                minimum_currency: item.category.minimum_currency,
                bid_increment: item.category.bid_increment,
                start_time: now,
                end_time,
            })
            .await?;
        self.scheduler.schedule(&auction);

        let announcement = AuctionEvent::Started {
            auction: auction.clone(),
            currency_name: defaults.currency_name,
            minimum_bid: auction.starting_price,
            required_dkp: auction.required_dkp(),
        };
        announce_best_effort(self.notifier.as_ref(), &scope, &announcement).await;

        info!(
            "{:<12} --> 경매 시작 id: {}, 마감: {}",
            "Controller", auction.id, auction.end_time
        );
        Ok(StartedAuction {
            auction,
            announcement,
        })
    }

    /// 수량/마감 수정 (진행 중인 경매만)
    pub async fn edit(&self, scope: &Scope, id: AuctionId, edit: EditAuction) -> AuctionResult<Auction> {
        if edit.quantity.is_none() && edit.duration_delta.is_none() {
            return Err(AuctionError::InvalidInput(
                "수량 또는 시간 중 하나는 지정해야 합니다.".to_string(),
            ));
        }
        if matches!(edit.quantity, Some(quantity) if quantity < 1) {
            return Err(AuctionError::InvalidInput(
                "수량은 1 이상이어야 합니다.".to_string(),
            ));
        }

        let _guard = self.locks.lock(scope).await;
        let auction = self.store.require(scope, id).await?;
        let now = self.clock.now();
        if !auction.is_open() || now >= auction.end_time {
            return Err(AuctionError::AuctionClosed(id));
        }

        if let Some(quantity) = edit.quantity {
            if auction.starting_price_for(quantity).is_none() {
                return Err(AuctionError::InvalidInput(format!(
                    "수량이 너무 큽니다: {}",
                    quantity
                )));
            }
        }
        let end_time = match edit.duration_delta {
            Some(delta) => Some(auction.end_time.checked_add_signed(delta).ok_or_else(|| {
                AuctionError::InvalidInput("수정된 마감 시각이 범위를 벗어났습니다.".to_string())
            })?),
            None => None,
        };
        if matches!(end_time, Some(end) if end <= now) {
            return Err(AuctionError::InvalidInput(
                "수정된 마감 시각이 이미 지났습니다.".to_string(),
            ));
        }

        let updated = self
            .store
            .update_quantity_and_deadline(scope, id, edit.quantity, end_time)
            .await?;
        if end_time.is_some() {
            self.scheduler.schedule(&updated);
        }

        info!(
            "{:<12} --> 경매 수정 id: {}, 수량: {}, 마감: {}",
            "Controller", id, updated.quantity, updated.end_time
        );
        Ok(updated)
    }

    /// 수동 종료
    /// 종료 타이머가 살아 있으면 확인을 요구한다.
    pub async fn end(&self, scope: &Scope, id: AuctionId, confirmed: bool) -> AuctionResult<EndOutcome> {
        let auction = self.store.require(scope, id).await?;
        if !auction.is_open() {
            return Err(AuctionError::AuctionClosed(id));
        }
        if !confirmed && self.scheduler.is_close_scheduled(id) {
            info!("{:<12} --> 종료 확인 필요 id: {}", "Controller", id);
            return Ok(EndOutcome::ConfirmationRequired(auction));
        }
        Ok(EndOutcome::Closed(self.force_end(scope, id).await?))
    }

    /// 확인 요청을 포함한 수동 종료
    pub async fn end_with_confirmation(
        &self,
        scope: &Scope,
        id: AuctionId,
        confirmer: &dyn Confirmer,
    ) -> AuctionResult<ConfirmedEnd> {
        let auction = match self.end(scope, id, false).await? {
            EndOutcome::Closed(outcome) => return Ok(ConfirmedEnd::Closed(outcome)),
            EndOutcome::ConfirmationRequired(auction) => auction,
        };

        match tokio::time::timeout(self.confirm_timeout, confirmer.confirm(&auction)).await {
            Ok(true) => Ok(ConfirmedEnd::Closed(self.force_end(scope, id).await?)),
            Ok(false) => {
                info!("{:<12} --> 종료 거절 id: {}", "Controller", id);
                Ok(ConfirmedEnd::Declined)
            }
            Err(_) => {
                warn!("{:<12} --> 종료 확인 시간 초과 id: {}", "Controller", id);
                Ok(ConfirmedEnd::TimedOut)
            }
        }
    }

    async fn force_end(&self, scope: &Scope, id: AuctionId) -> AuctionResult<CloseOutcome> {
        info!("{:<12} --> 수동 종료 id: {}", "Controller", id);
        self.scheduler.cancel(id);
        self.scheduler.settle(scope, id).await
    }

    /// 경매 취소. 경매와 입찰을 지우고 이력은 남기지 않는다.
    pub async fn cancel(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Auction> {
        let auction = {
            let _guard = self.locks.lock(scope).await;
            let auction = self.store.require(scope, id).await?;
            if !auction.is_open() {
                return Err(AuctionError::AuctionClosed(id));
            }
            self.scheduler.cancel(id);
            self.store.delete(scope, id).await?;
            auction
        };

        release_best_effort(self.notifier.as_ref(), scope, &auction.references()).await;
        info!("{:<12} --> 경매 취소 id: {}", "Controller", id);
        Ok(auction)
    }

    // -- Bidding

    /// 입찰. 선두가 바뀌면 밀려난 입찰자에게 알린다.
    pub async fn place_bid(&self, scope: &Scope, cmd: PlaceBidCommand) -> AuctionResult<BidReceipt> {
        let receipt = self.bids.place_bid(scope, cmd).await?;
        if let Some(user_id) = &receipt.outbid_user {
            let event = AuctionEvent::Outbid {
                auction_id: receipt.bid.auction_id,
                item_name: receipt.item_name.clone(),
                user_id: user_id.clone(),
                new_amount: receipt.bid.amount,
                timestamp: receipt.bid.placed_at,
            };
            announce_best_effort(self.notifier.as_ref(), scope, &event).await;
        }
        Ok(receipt)
    }

    pub async fn minimum_bid(&self, scope: &Scope, id: AuctionId) -> AuctionResult<i64> {
        let auction = self.store.require(scope, id).await?;
        self.bids.minimum_bid(scope, &auction).await
    }

    pub async fn risk_for_user(&self, scope: &Scope, user_id: &str) -> AuctionResult<i64> {
        self.bids.risk_for_user(scope, user_id, None).await
    }

    // -- Queries

    pub async fn get(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Auction> {
        self.store.require(scope, id).await
    }

    /// 경매 상세 (입찰 목록, 현재 최소 입찰가 포함)
    pub async fn snapshot(&self, scope: &Scope, id: AuctionId) -> AuctionResult<AuctionSnapshot> {
        let auction = self.store.require(scope, id).await?;
        let bids = self.store.bids(scope, id).await?;
        let minimum_bid = self.bids.minimum_bid(scope, &auction).await?;
        Ok(AuctionSnapshot {
            close_scheduled: self.scheduler.is_close_scheduled(id),
            auction,
            bids,
            minimum_bid,
        })
    }

    pub async fn open_auctions(&self, scope: &Scope) -> AuctionResult<Vec<Auction>> {
        self.store.find_open(scope).await
    }

    pub async fn find_open_by_thread(&self, scope: &Scope, thread_ref: &str) -> AuctionResult<Auction> {
        self.store
            .find_open_by_thread(scope, thread_ref)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("thread {}", thread_ref)))
    }

    /// 외부 핸들 연결 (스레드, 공지 메시지)
    pub async fn attach_references(
        &self,
        scope: &Scope,
        id: AuctionId,
        refs: ExternalRefs,
    ) -> AuctionResult<Auction> {
        let auction = self.store.set_references(scope, id, &refs).await?;
        info!("{:<12} --> 외부 핸들 연결 id: {}", "Controller", id);
        Ok(auction)
    }

    /// 기간 내 경매 이력 (최신순)
    pub async fn history(&self, scope: &Scope, since: Duration) -> AuctionResult<Vec<AuctionHistoryRecord>> {
        let from = self.history_start(since)?;
        self.store.history_since(scope, from).await
    }

    /// 경매 이력 공지
    pub async fn announce_history(
        &self,
        scope: &Scope,
        since: Duration,
    ) -> AuctionResult<Vec<AuctionHistoryRecord>> {
        let from = self.history_start(since)?;
        let records = self.store.history_since(scope, from).await?;
        let event = AuctionEvent::History {
            since: from,
            records: records.clone(),
        };
        announce_best_effort(self.notifier.as_ref(), scope, &event).await;
        Ok(records)
    }

    /// 이력 조회 시작 시각 (now - since)
    fn history_start(&self, since: Duration) -> AuctionResult<DateTime<Utc>> {
        if since < Duration::zero() {
            return Err(AuctionError::InvalidInput(
                "조회 기간은 0 이상이어야 합니다.".to_string(),
            ));
        }
        Ok(self
            .clock
            .now()
            .checked_sub_signed(since)
            .unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    // -- Points

    pub async fn balance(&self, scope: &Scope, user_id: &str) -> AuctionResult<i64> {
        self.ledger.balance(scope, user_id).await
    }

    pub async fn adjust_points(
        &self,
        scope: &Scope,
        user_id: &str,
        delta: i64,
        description: &str,
    ) -> AuctionResult<i64> {
        self.ledger.adjust(scope, user_id, delta, description).await
    }

    /// 일괄 포인트 지급/차감
    pub async fn grant_points(
        &self,
        scope: &Scope,
        adjustments: Vec<PointAdjustment>,
    ) -> AuctionResult<Vec<BalanceChange>> {
        if adjustments.is_empty() {
            return Err(AuctionError::InvalidInput(
                "조정 항목이 비어 있습니다.".to_string(),
            ));
        }
        self.ledger.adjust_many(scope, adjustments).await
    }

    pub async fn transactions(
        &self,
        scope: &Scope,
        user_id: &str,
        limit: i64,
    ) -> AuctionResult<Vec<LedgerTransaction>> {
        self.ledger.transactions(scope, user_id, limit).await
    }
}
// endregion: --- Auction Controller
