// region:    --- Imports
use crate::bidding::model::Bid;
use crate::clock::from_millis;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;

// endregion: --- Imports

pub type AuctionId = i64;

// region:    --- Scope
/// 길드/게임 테넌트 키. 모든 엔티티는 이 쌍으로 분리된다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub guild_id: String,
    pub game_id: String,
}

impl Scope {
    pub fn new(guild_id: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            game_id: game_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.guild_id, self.game_id)
    }
}
// endregion: --- Scope

// region:    --- Auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Open,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("알 수 없는 경매 상태: {}", other)),
        }
    }
}

/// 경매 모델
///
/// 아이템 이름과 카테고리 가격 정보는 시작 시점에 복사해 둔다.
/// 이후 카탈로그가 바뀌거나 아이템이 삭제되어도 검증과 정산은 같은 값을 사용한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub guild_id: String,
    pub game_id: String,
    pub item_id: String,
    pub item_name: String,
    pub category_name: String,
    pub quantity: i64,
    pub minimum_dkp: i64,
    pub minimum_currency: i64,
    pub bid_increment: i64,
    pub starting_price: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub thread_ref: Option<String>,
    pub announcement_ref: Option<String>,
}

impl Auction {
    pub fn scope(&self) -> Scope {
        Scope::new(self.guild_id.clone(), self.game_id.clone())
    }

    pub fn is_open(&self) -> bool {
        self.status == AuctionStatus::Open
    }

    /// 낙찰 시 차감되는 DKP (수량 × 카테고리 최소 DKP)
    pub fn required_dkp(&self) -> i64 {
        self.quantity.saturating_mul(self.minimum_dkp)
    }

    /// 입찰 단위 (수량 × 카테고리 입찰 증가폭)
    pub fn bid_step(&self) -> i64 {
        self.quantity.saturating_mul(self.bid_increment)
    }

    /// 수량을 바꿨을 때의 시작가. 수량에 비례하는 금액이 i64 를 넘으면 None
    pub fn starting_price_for(&self, quantity: i64) -> Option<i64> {
        scaled_starting_price(
            quantity,
            self.minimum_dkp,
            self.minimum_currency,
            self.bid_increment,
        )
    }

    pub fn cleanup_deadline(&self, grace: Duration) -> DateTime<Utc> {
        self.end_time
            .checked_add_signed(grace)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn references(&self) -> ExternalRefs {
        ExternalRefs {
            thread_ref: self.thread_ref.clone(),
            announcement_ref: self.announcement_ref.clone(),
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for Auction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<AuctionStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let closed_at: Option<i64> = row.try_get("closed_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            guild_id: row.try_get("guild_id")?,
            game_id: row.try_get("game_id")?,
            item_id: row.try_get("item_id")?,
            item_name: row.try_get("item_name")?,
            category_name: row.try_get("category_name")?,
            quantity: row.try_get("quantity")?,
            minimum_dkp: row.try_get("minimum_dkp")?,
            minimum_currency: row.try_get("minimum_currency")?,
            bid_increment: row.try_get("bid_increment")?,
            starting_price: row.try_get("starting_price")?,
            start_time: from_millis(row.try_get("start_ts")?),
            end_time: from_millis(row.try_get("end_ts")?),
            status,
            closed_at: closed_at.map(from_millis),
            thread_ref: row.try_get("thread_ref")?,
            announcement_ref: row.try_get("announcement_ref")?,
        })
    }
}

/// 경매 생성 요청 (가격 정보는 컨트롤러가 카탈로그에서 계산해 채운다)
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub scope: Scope,
    pub item_id: String,
    pub item_name: String,
    pub category_name: String,
    pub quantity: i64,
    pub minimum_dkp: i64,
    pub minimum_currency: i64,
    pub bid_increment: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewAuction {
    /// 수량 × 최소 재화. 수량에 비례하는 금액이 i64 를 넘으면 None
    pub fn starting_price(&self) -> Option<i64> {
        scaled_starting_price(
            self.quantity,
            self.minimum_dkp,
            self.minimum_currency,
            self.bid_increment,
        )
    }
}

/// 시작가, 필요 DKP, 입찰 단위가 모두 표현 가능할 때만 시작가를 돌려준다
fn scaled_starting_price(
    quantity: i64,
    minimum_dkp: i64,
    minimum_currency: i64,
    bid_increment: i64,
) -> Option<i64> {
    quantity.checked_mul(minimum_dkp)?;
    quantity.checked_mul(bid_increment)?;
    quantity.checked_mul(minimum_currency)
}

/// 알림 협력자가 소유하는 외부 핸들 (스레드, 공지 메시지)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRefs {
    pub thread_ref: Option<String>,
    pub announcement_ref: Option<String>,
}

impl ExternalRefs {
    pub fn is_empty(&self) -> bool {
        self.thread_ref.is_none() && self.announcement_ref.is_none()
    }
}
// endregion: --- Auction

// region:    --- History
/// 정산 시 한 번만 기록되는 경매 이력
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionHistoryRecord {
    pub auction_id: AuctionId,
    pub winner_id: Option<String>,
    pub winning_amount: i64,
    pub item_name: String,
    pub category_name: String,
    pub quantity: i64,
    pub closed_at: DateTime<Utc>,
    pub bids: Vec<Bid>,
}

impl<'r> FromRow<'r, SqliteRow> for AuctionHistoryRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let bids: String = row.try_get("bids")?;
        let bids: Vec<Bid> =
            serde_json::from_str(&bids).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            auction_id: row.try_get("auction_id")?,
            winner_id: row.try_get("winner_id")?,
            winning_amount: row.try_get("winning_amount")?,
            item_name: row.try_get("item_name")?,
            category_name: row.try_get("category_name")?,
            quantity: row.try_get("quantity")?,
            closed_at: from_millis(row.try_get("closed_at")?),
            bids,
        })
    }
}
// endregion: --- History

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_text() {
        assert_eq!("open".parse::<AuctionStatus>(), Ok(AuctionStatus::Open));
        assert_eq!(AuctionStatus::Closed.as_str(), "closed");
        assert!("pending".parse::<AuctionStatus>().is_err());
    }

    #[test]
    fn test_starting_price_scales_with_quantity() {
        let now = Utc::now();
        let new = NewAuction {
            scope: Scope::new("g", "x"),
            item_id: "sword".to_string(),
            item_name: "Sword".to_string(),
            category_name: "Weapon".to_string(),
            quantity: 2,
            minimum_dkp: 10,
            minimum_currency: 100,
            bid_increment: 10,
            start_time: now,
            end_time: now + Duration::hours(1),
        };
        assert_eq!(new.starting_price(), Some(200));

        let huge = NewAuction {
            quantity: i64::MAX / 50,
            ..new
        };
        assert_eq!(huge.starting_price(), None);
    }
}
