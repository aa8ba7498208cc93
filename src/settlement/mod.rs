/// 경매 정산
/// 낙찰자 결정, 이력 기록, DKP 차감, 종료 처리를 하나의 트랜잭션으로 처리한다.
/// 이미 종료된 경매는 아무것도 하지 않으므로 수동 종료와 자동 종료가 겹쳐도 한 번만 정산된다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionHistoryRecord, AuctionId, Scope};
use crate::bidding::validator::select_winner;
use crate::clock::{from_millis, to_millis, Clock};
use crate::database::DatabaseManager;
use crate::error::{AuctionError, AuctionResult};
use crate::ledger::{self, BalanceChange, Ledger};
use crate::locks::ScopeLocks;
use crate::notify::{announce_best_effort, Notifier};
use crate::store::{self, AuctionStore};
use std::sync::Arc;
use tracing::{error, info};

// endregion: --- Imports

pub const SETTLEMENT_DESCRIPTION: &str = "auction settlement";

// region:    --- Outcome
#[derive(Debug, Clone)]
pub struct Settlement {
    pub auction: Auction,
    pub record: AuctionHistoryRecord,
    /// 낙찰자 잔액 변경 (낙찰자가 없으면 None)
    pub charge: Option<BalanceChange>,
    pub cost: i64,
}

#[derive(Debug, Clone)]
pub enum CloseOutcome {
    AlreadyClosed(Auction),
    Settled(Box<Settlement>),
}
// endregion: --- Outcome

// region:    --- Settlement Engine
pub struct SettlementEngine {
    db: Arc<DatabaseManager>,
    store: Arc<AuctionStore>,
    ledger: Arc<Ledger>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<ScopeLocks>,
    clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    pub fn new(
        db: Arc<DatabaseManager>,
        store: Arc<AuctionStore>,
        ledger: Arc<Ledger>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<ScopeLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            store,
            ledger,
            notifier,
            locks,
            clock,
        }
    }

    /// 경매 종료 및 정산
    /// 원장/저장소 실패는 SettlementError 로 올리고 경매는 진행 중으로 남는다.
    pub async fn close(&self, scope: &Scope, id: AuctionId) -> AuctionResult<CloseOutcome> {
        info!("{:<12} --> 경매 정산 시작 id: {}", "Settlement", id);
        let outcome = {
            let _guard = self.locks.lock(scope).await;
            self.settle_locked(scope, id).await
        };

        let settlement = match outcome {
            Ok(CloseOutcome::Settled(settlement)) => settlement,
            Ok(CloseOutcome::AlreadyClosed(auction)) => {
                info!("{:<12} --> 이미 종료된 경매 id: {}", "Settlement", id);
                return Ok(CloseOutcome::AlreadyClosed(auction));
            }
            Err(e @ AuctionError::NotFound(_)) => return Err(e),
            Err(e) => {
                error!("{:<12} --> 경매 정산 실패 id: {}, {}", "Settlement", id, e);
                return Err(AuctionError::Settlement(e.to_string()));
            }
        };

        self.announce(scope, &settlement).await;
        info!(
            "{:<12} --> 경매 정산 완료 id: {}, 낙찰자: {:?}",
            "Settlement", id, settlement.record.winner_id
        );
        Ok(CloseOutcome::Settled(settlement))
    }

    async fn settle_locked(&self, scope: &Scope, id: AuctionId) -> AuctionResult<CloseOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let auction = store::get_in(&mut tx, scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))?;
        if !auction.is_open() {
            tx.rollback().await?;
            return Ok(CloseOutcome::AlreadyClosed(auction));
        }

        let bids = store::bids_in(&mut tx, id).await?;
        let winner = select_winner(&bids).cloned();
        // 마감 후에 정산되면(재시작 복구 등) 마감 시각을 종료 시각으로 기록한다.
        // 저장 정밀도(밀리초)에 맞춰 두어 기록과 조회 결과가 같게 한다.
        let closed_at = from_millis(to_millis(self.clock.now().min(auction.end_time)));

        if !store::mark_closed_in(&mut tx, scope, id, closed_at).await? {
            tx.rollback().await?;
            return Ok(CloseOutcome::AlreadyClosed(auction));
        }

        let record = AuctionHistoryRecord {
            auction_id: id,
            winner_id: winner.as_ref().map(|w| w.bidder_id.clone()),
            winning_amount: winner.as_ref().map(|w| w.amount).unwrap_or(0),
            item_name: auction.item_name.clone(),
            category_name: auction.category_name.clone(),
            quantity: auction.quantity,
            closed_at,
            bids,
        };
        store::insert_history_in(&mut tx, &record).await?;

        let cost = auction.required_dkp();
        let charge = match &winner {
            Some(winner) => Some(
                ledger::adjust_in(
                    &mut tx,
                    scope,
                    &winner.bidder_id,
                    -cost,
                    SETTLEMENT_DESCRIPTION,
                    closed_at,
                )
                .await?,
            ),
            None => None,
        };

        let closed = store::get_in(&mut tx, scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))?;
        tx.commit().await?;

        self.store.invalidate(scope);
        if let Some(charge) = &charge {
            self.ledger.invalidate(scope, &charge.user_id);
        }

        Ok(CloseOutcome::Settled(Box::new(Settlement {
            auction: closed,
            record,
            charge,
            cost,
        })))
    }

    /// 낙찰/로그 알림 (실패는 무시)
    async fn announce(&self, scope: &Scope, settlement: &Settlement) {
        let record = &settlement.record;
        if let (Some(winner_id), Some(charge)) = (&record.winner_id, &settlement.charge) {
            let won = AuctionEvent::Won {
                auction_id: record.auction_id,
                item_name: record.item_name.clone(),
                winner_id: winner_id.clone(),
                amount: record.winning_amount,
                cost: settlement.cost,
                old_balance: charge.old_balance,
                new_balance: charge.new_balance,
            };
            announce_best_effort(self.notifier.as_ref(), scope, &won).await;
        }

        let message = match &record.winner_id {
            Some(winner_id) => format!(
                "{} x{} 낙찰: {} ({} / {} DKP)",
                record.item_name, record.quantity, winner_id, record.winning_amount, settlement.cost
            ),
            None => format!("{} x{} 유찰: 입찰 없음", record.item_name, record.quantity),
        };
        let log = AuctionEvent::Log {
            auction_id: record.auction_id,
            item_name: record.item_name.clone(),
            winner_id: record.winner_id.clone(),
            amount: record.winning_amount,
            cost: if record.winner_id.is_some() {
                settlement.cost
            } else {
                0
            },
            message,
            timestamp: record.closed_at,
        };
        announce_best_effort(self.notifier.as_ref(), scope, &log).await;
    }
}
// endregion: --- Settlement Engine
