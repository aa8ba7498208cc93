use crate::auction::model::AuctionId;
use crate::clock::from_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

// 입찰 모델 (생성 후 변경되지 않는다)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub auction_id: AuctionId,
    pub bidder_id: String,
    pub amount: i64,
    pub placed_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Bid {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            auction_id: row.try_get("auction_id")?,
            bidder_id: row.try_get("bidder_id")?,
            amount: row.try_get("amount")?,
            placed_at: from_millis(row.try_get("placed_at")?),
        })
    }
}

// 입찰 명령
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidCommand {
    pub auction_id: AuctionId,
    pub bidder_id: String,
    pub amount: i64,
}

// 입찰 수락 결과
#[derive(Debug, Clone, Serialize)]
pub struct BidReceipt {
    pub bid: Bid,
    pub item_name: String,
    /// 새 입찰로 밀려난 이전 최고 입찰자 (본인 재입찰이면 None)
    pub outbid_user: Option<String>,
    pub next_minimum: i64,
}
