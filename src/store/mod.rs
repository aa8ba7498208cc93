/// 경매 저장소
/// 경매와 입찰의 영속 기록을 관리하고, 아이템당 진행 중 경매 하나라는 불변식을 지킨다.
/// 모든 조회/쓰기는 길드+게임 범위로 제한된다.
// region:    --- Imports
pub mod queries;

use crate::auction::model::{
    Auction, AuctionHistoryRecord, AuctionId, ExternalRefs, NewAuction, Scope,
};
use crate::bidding::model::Bid;
use crate::cache::CacheAside;
use crate::clock::{from_millis, to_millis};
use crate::database::DatabaseManager;
use crate::error::{AuctionError, AuctionResult};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Auction Store
pub struct AuctionStore {
    db: Arc<DatabaseManager>,
    open_cache: CacheAside<Scope, Vec<Auction>>,
}

impl AuctionStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self {
            db,
            open_cache: CacheAside::new(),
        }
    }

    /// 경매 생성
    /// 같은 아이템의 진행 중 경매가 있으면 부분 유니크 인덱스가 거부한다.
    pub async fn create(&self, new: NewAuction) -> AuctionResult<Auction> {
        let starting_price = new.starting_price().ok_or_else(|| {
            AuctionError::InvalidInput(format!("수량이 너무 큽니다: {}", new.quantity))
        })?;
        let mut conn = self.db.pool().acquire().await?;
        let inserted = sqlx::query_scalar::<_, i64>(queries::INSERT_AUCTION)
            .bind(&new.scope.guild_id)
            .bind(&new.scope.game_id)
            .bind(&new.item_id)
            .bind(&new.item_name)
            .bind(&new.category_name)
            .bind(new.quantity)
            .bind(new.minimum_dkp)
            .bind(new.minimum_currency)
            .bind(new.bid_increment)
            .bind(starting_price)
            .bind(to_millis(new.start_time))
            .bind(to_millis(new.end_time))
            .fetch_one(&mut *conn)
            .await;

        let id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                warn!(
                    "{:<12} --> 중복 경매 거부: scope={}, item={}",
                    "Store", new.scope, new.item_id
                );
                return Err(AuctionError::Conflict(new.item_id));
            }
            Err(e) => return Err(e.into()),
        };
        self.invalidate(&new.scope);

        info!("{:<12} --> 경매 생성 id: {}", "Store", id);
        get_in(&mut conn, &new.scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))
    }

    /// 경매 조회
    pub async fn get(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Option<Auction>> {
        let mut conn = self.db.pool().acquire().await?;
        get_in(&mut conn, scope, id).await
    }

    /// 경매 조회 (없으면 NotFound)
    pub async fn require(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Auction> {
        self.get(scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))
    }

    /// 스레드 핸들로 진행 중 경매 조회
    pub async fn find_open_by_thread(
        &self,
        scope: &Scope,
        thread_ref: &str,
    ) -> AuctionResult<Option<Auction>> {
        let auction = sqlx::query_as::<_, Auction>(&queries::find_open_by_thread())
            .bind(thread_ref)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(auction)
    }

    /// 범위 내 진행 중 경매 (캐시 어사이드)
    pub async fn find_open(&self, scope: &Scope) -> AuctionResult<Vec<Auction>> {
        if let Some(cached) = self.open_cache.get(scope) {
            return Ok(cached);
        }
        let auctions = sqlx::query_as::<_, Auction>(&queries::find_open())
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .fetch_all(self.db.pool())
            .await?;
        self.open_cache.put(scope.clone(), auctions.clone());
        Ok(auctions)
    }

    /// 수량/마감 수정 (진행 중인 경매만)
    pub async fn update_quantity_and_deadline(
        &self,
        scope: &Scope,
        id: AuctionId,
        quantity: Option<i64>,
        end_time: Option<DateTime<Utc>>,
    ) -> AuctionResult<Auction> {
        let mut conn = self.db.pool().acquire().await?;
        let result = sqlx::query(queries::UPDATE_QUANTITY_AND_DEADLINE)
            .bind(quantity)
            .bind(end_time.map(to_millis))
            .bind(id)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuctionError::NotFound(format!("open auction {}", id)));
        }
        self.invalidate(scope);

        info!("{:<12} --> 경매 수정 id: {}", "Store", id);
        get_in(&mut conn, scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))
    }

    /// 종료 처리. 이미 종료된 경매는 그대로 돌려준다.
    pub async fn mark_closed(
        &self,
        scope: &Scope,
        id: AuctionId,
        closed_at: DateTime<Utc>,
    ) -> AuctionResult<Auction> {
        let mut conn = self.db.pool().acquire().await?;
        if mark_closed_in(&mut conn, scope, id, closed_at).await? {
            self.invalidate(scope);
        }
        get_in(&mut conn, scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))
    }

    /// 진행 중인 경매와 입찰 삭제 (이력은 남기지 않는다)
    pub async fn delete(&self, scope: &Scope, id: AuctionId) -> AuctionResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let open = get_in(&mut tx, scope, id).await?.filter(Auction::is_open);
        if open.is_none() {
            tx.rollback().await?;
            return Err(AuctionError::NotFound(format!("open auction {}", id)));
        }

        sqlx::query(queries::DELETE_BIDS)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(queries::DELETE_OPEN_AUCTION)
            .bind(id)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.invalidate(scope);

        info!("{:<12} --> 경매 삭제 id: {}", "Store", id);
        Ok(())
    }

    /// 입찰 목록 (입찰 시각 순)
    pub async fn bids(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Vec<Bid>> {
        let mut conn = self.db.pool().acquire().await?;
        if get_in(&mut conn, scope, id).await?.is_none() {
            return Err(AuctionError::NotFound(format!("auction {}", id)));
        }
        bids_in(&mut conn, id).await
    }

    /// 기간 내 경매 이력 (최신순)
    pub async fn history_since(
        &self,
        scope: &Scope,
        since: DateTime<Utc>,
    ) -> AuctionResult<Vec<AuctionHistoryRecord>> {
        let records = sqlx::query_as::<_, AuctionHistoryRecord>(queries::GET_HISTORY_SINCE)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .bind(to_millis(since))
            .fetch_all(self.db.pool())
            .await?;
        Ok(records)
    }

    /// 외부 핸들 연결/해제
    pub async fn set_references(
        &self,
        scope: &Scope,
        id: AuctionId,
        refs: &ExternalRefs,
    ) -> AuctionResult<Auction> {
        let mut conn = self.db.pool().acquire().await?;
        let result = sqlx::query(queries::SET_REFERENCES)
            .bind(&refs.thread_ref)
            .bind(&refs.announcement_ref)
            .bind(id)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuctionError::NotFound(format!("auction {}", id)));
        }
        self.invalidate(scope);
        get_in(&mut conn, scope, id)
            .await?
            .ok_or_else(|| AuctionError::NotFound(format!("auction {}", id)))
    }

    pub async fn clear_references(&self, scope: &Scope, id: AuctionId) -> AuctionResult<Auction> {
        self.set_references(scope, id, &ExternalRefs::default())
            .await
    }

    /// 재시작 복구 대상 (모든 범위)
    pub async fn recovery_candidates(&self) -> AuctionResult<Vec<Auction>> {
        let auctions = sqlx::query_as::<_, Auction>(&queries::recovery_candidates())
            .fetch_all(self.db.pool())
            .await?;
        Ok(auctions)
    }

    /// 진행 중 경매 캐시 무효화. 트랜잭션 밖에서 경매를 바꾼 쪽이 커밋 후 호출한다.
    pub fn invalidate(&self, scope: &Scope) {
        self.open_cache.invalidate(scope);
    }
}
// endregion: --- Auction Store

// region:    --- Connection Helpers
/// 트랜잭션 안에서 쓰는 저장소 연산들

pub(crate) async fn get_in(
    conn: &mut SqliteConnection,
    scope: &Scope,
    id: AuctionId,
) -> AuctionResult<Option<Auction>> {
    let auction = sqlx::query_as::<_, Auction>(&queries::get_auction())
        .bind(id)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(auction)
}

/// 진행 중일 때만 종료로 바꾼다. 실제로 바뀌었으면 true.
pub(crate) async fn mark_closed_in(
    conn: &mut SqliteConnection,
    scope: &Scope,
    id: AuctionId,
    closed_at: DateTime<Utc>,
) -> AuctionResult<bool> {
    let result = sqlx::query(queries::MARK_CLOSED)
        .bind(to_millis(closed_at))
        .bind(id)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn bids_in(conn: &mut SqliteConnection, id: AuctionId) -> AuctionResult<Vec<Bid>> {
    let bids = sqlx::query_as::<_, Bid>(queries::GET_BIDS)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(bids)
}

pub(crate) async fn highest_bid_in(
    conn: &mut SqliteConnection,
    id: AuctionId,
) -> AuctionResult<Option<Bid>> {
    let bid = sqlx::query_as::<_, Bid>(queries::GET_HIGHEST_BID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(bid)
}

pub(crate) async fn insert_bid_in(
    conn: &mut SqliteConnection,
    auction_id: AuctionId,
    bidder_id: &str,
    amount: i64,
    placed_at: DateTime<Utc>,
) -> AuctionResult<Bid> {
    let id = sqlx::query_scalar::<_, i64>(queries::INSERT_BID)
        .bind(auction_id)
        .bind(bidder_id)
        .bind(amount)
        .bind(to_millis(placed_at))
        .fetch_one(&mut *conn)
        .await?;
    Ok(Bid {
        id,
        auction_id,
        bidder_id: bidder_id.to_string(),
        amount,
        placed_at: from_millis(to_millis(placed_at)),
    })
}

pub(crate) async fn insert_history_in(
    conn: &mut SqliteConnection,
    record: &AuctionHistoryRecord,
) -> AuctionResult<()> {
    let bids = serde_json::to_string(&record.bids)?;
    sqlx::query(queries::INSERT_HISTORY)
        .bind(record.auction_id)
        .bind(&record.winner_id)
        .bind(record.winning_amount)
        .bind(&record.item_name)
        .bind(&record.category_name)
        .bind(record.quantity)
        .bind(to_millis(record.closed_at))
        .bind(bids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
// endregion: --- Connection Helpers
