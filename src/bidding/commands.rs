/// 입찰 관련 커맨드 처리
/// 입찰 수락은 범위 잠금 안에서 최신 최고 입찰을 기준으로 검증한 뒤 기록한다.
// region:    --- Imports
use super::model::{BidReceipt, PlaceBidCommand};
use super::validator::{check_bid, minimum_bid, risk_for_user, select_winner};
use crate::auction::model::{Auction, AuctionId, Scope};
use crate::clock::Clock;
use crate::database::DatabaseManager;
use crate::error::{AuctionError, AuctionResult};
use crate::ledger::Ledger;
use crate::locks::ScopeLocks;
use crate::store;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Bid Service
pub struct BidService {
    db: Arc<DatabaseManager>,
    ledger: Arc<Ledger>,
    locks: Arc<ScopeLocks>,
    clock: Arc<dyn Clock>,
}

impl BidService {
    pub fn new(
        db: Arc<DatabaseManager>,
        ledger: Arc<Ledger>,
        locks: Arc<ScopeLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            ledger,
            locks,
            clock,
        }
    }

    /// 입찰
    pub async fn place_bid(&self, scope: &Scope, cmd: PlaceBidCommand) -> AuctionResult<BidReceipt> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Bidding", cmd);
        if cmd.amount < 0 {
            return Err(AuctionError::InvalidInput(
                "입찰 금액은 0 이상이어야 합니다.".to_string(),
            ));
        }

        let _guard = self.locks.lock(scope).await;
        let now = self.clock.now();
        let mut tx = self.db.pool().begin().await?;

        let auction = store::get_in(&mut tx, scope, cmd.auction_id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", cmd.auction_id)))?;
        if !auction.is_open() || now > auction.end_time {
            warn!(
                "{:<12} --> 종료된 경매에 대한 입찰 거부: {}",
                "Bidding", auction.id
            );
            return Err(AuctionError::AuctionClosed(auction.id));
        }

        let highest = store::highest_bid_in(&mut tx, auction.id).await?;
        let risk = risk_for_user(&mut tx, scope, &cmd.bidder_id, Some(auction.id)).await?;
        let balance = self
            .ledger
            .balance_in(&mut tx, scope, &cmd.bidder_id)
            .await?;

        if let Err(e) = check_bid(&auction, highest.as_ref(), balance, risk, cmd.amount) {
            warn!("{:<12} --> 입찰 거부: {}", "Bidding", e);
            tx.rollback().await?;
            return Err(e);
        }

        let bid =
            store::insert_bid_in(&mut tx, auction.id, &cmd.bidder_id, cmd.amount, now).await?;
        tx.commit().await?;

        // 같은 금액이면 먼저 들어온 입찰이 선두이므로 새 입찰이 선두가 아닐 수 있다
        let candidates: Vec<_> = highest.iter().cloned().chain([bid.clone()]).collect();
        let leader = select_winner(&candidates);
        let outbid_user = match (&highest, leader) {
            (Some(previous), Some(leader))
                if leader.id == bid.id && previous.bidder_id != bid.bidder_id =>
            {
                Some(previous.bidder_id.clone())
            }
            _ => None,
        };
        let next_minimum = minimum_bid(&auction, leader);

        info!(
            "{:<12} --> 입찰 성공: auction={}, bidder={}, amount={}",
            "Bidding", auction.id, bid.bidder_id, bid.amount
        );
        Ok(BidReceipt {
            bid,
            item_name: auction.item_name,
            outbid_user,
            next_minimum,
        })
    }

    /// 현재 최소 입찰가
    pub async fn minimum_bid(&self, scope: &Scope, auction: &Auction) -> AuctionResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        if store::get_in(&mut conn, scope, auction.id).await?.is_none() {
            return Err(AuctionError::NotFound(format!("auction {}", auction.id)));
        }
        let highest = store::highest_bid_in(&mut conn, auction.id).await?;
        Ok(minimum_bid(auction, highest.as_ref()))
    }

    /// 사용자의 위험 DKP
    pub async fn risk_for_user(
        &self,
        scope: &Scope,
        user_id: &str,
        excluding: Option<AuctionId>,
    ) -> AuctionResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        risk_for_user(&mut conn, scope, user_id, excluding).await
    }
}
// endregion: --- Bid Service
