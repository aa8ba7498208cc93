/// 입찰 검증
/// 1. 최소 입찰가 계산
/// 2. 사용자가 현재 선두인 경매들에 묶인 DKP(위험 DKP) 계산
/// 3. 낙찰자 결정
// region:    --- Imports
use super::model::Bid;
use crate::auction::model::{Auction, AuctionId, Scope};
use crate::error::{AuctionError, AuctionResult};
use crate::store::queries;
use sqlx::{Row, SqliteConnection};
use std::cmp::Ordering;

// endregion: --- Imports

// region:    --- Pure Rules
/// 최고 입찰 비교: 금액이 높을수록, 같은 금액이면 먼저 들어온 입찰이 앞선다.
fn leads(candidate: &Bid, current: &Bid) -> bool {
    match candidate.amount.cmp(&current.amount) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => (candidate.placed_at, candidate.id) < (current.placed_at, current.id),
    }
}

/// 낙찰 입찰 선택. 입찰이 없으면 낙찰자도 없다.
pub fn select_winner(bids: &[Bid]) -> Option<&Bid> {
    bids.iter().fold(None, |best, bid| match best {
        Some(current) if !leads(bid, current) => Some(current),
        _ => Some(bid),
    })
}

/// 최소 입찰가
/// 입찰이 없으면 시작가, 있으면 최고가 + (입찰 증가폭 × 수량)
pub fn minimum_bid(auction: &Auction, highest: Option<&Bid>) -> i64 {
    match highest {
        None => auction.starting_price,
        Some(bid) => bid.amount.saturating_add(auction.bid_step()),
    }
}
// endregion: --- Pure Rules

// region:    --- Connection Rules
/// 범위 내 진행 중인 경매 중 사용자가 선두인 경매들의 필요 DKP 합
/// `excluding` 경매는 평가 대상이므로 합산하지 않는다.
pub async fn risk_for_user(
    conn: &mut SqliteConnection,
    scope: &Scope,
    user_id: &str,
    excluding: Option<AuctionId>,
) -> AuctionResult<i64> {
    let rows = sqlx::query(queries::OPEN_AUCTION_LEADERS)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut risk = 0;
    for row in rows {
        let id: AuctionId = row.try_get("id")?;
        let leader: Option<String> = row.try_get("leader")?;
        if Some(id) == excluding || leader.as_deref() != Some(user_id) {
            continue;
        }
        let quantity: i64 = row.try_get("quantity")?;
        let minimum_dkp: i64 = row.try_get("minimum_dkp")?;
        risk = quantity.saturating_mul(minimum_dkp).saturating_add(risk);
    }
    Ok(risk)
}

/// 입찰 가능 여부 검증
/// 잔액 부족을 먼저 확인하고, 그 다음 최소 입찰가를 확인한다.
/// 다음 최소 입찰가(금액 + 입찰 단위)를 표현할 수 없는 금액은 받지 않는다.
pub fn check_bid(
    auction: &Auction,
    highest: Option<&Bid>,
    balance: i64,
    risk: i64,
    amount: i64,
) -> AuctionResult<()> {
    if amount.checked_add(auction.bid_step()).is_none() {
        return Err(AuctionError::InvalidInput(format!(
            "입찰 금액이 너무 큽니다: {}",
            amount
        )));
    }

    let required = risk.saturating_add(auction.required_dkp());
    if balance < required {
        return Err(AuctionError::InsufficientFunds { balance, required });
    }

    let minimum = minimum_bid(auction, highest);
    if amount < minimum {
        return Err(AuctionError::BidTooLow {
            minimum,
            offered: amount,
        });
    }
    Ok(())
}
// endregion: --- Connection Rules
