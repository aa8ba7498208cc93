use super::model::{Auction, AuctionHistoryRecord, AuctionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 알림 협력자에게 전달되는 경매 이벤트
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuctionEvent {
    // 경매 시작 공지
    Started {
        auction: Auction,
        currency_name: String,
        minimum_bid: i64,
        required_dkp: i64,
    },
    // 최고 입찰자가 바뀜
    Outbid {
        auction_id: AuctionId,
        item_name: String,
        user_id: String,
        new_amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 낙찰 및 DKP 차감
    Won {
        auction_id: AuctionId,
        item_name: String,
        winner_id: String,
        amount: i64,
        cost: i64,
        old_balance: i64,
        new_balance: i64,
    },
    // 운영 로그
    Log {
        auction_id: AuctionId,
        item_name: String,
        winner_id: Option<String>,
        amount: i64,
        cost: i64,
        message: String,
        timestamp: DateTime<Utc>,
    },
    // 경매 이력 요약
    History {
        since: DateTime<Utc>,
        records: Vec<AuctionHistoryRecord>,
    },
}

impl AuctionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Outbid { .. } => "outbid",
            Self::Won { .. } => "won",
            Self::Log { .. } => "log",
            Self::History { .. } => "history",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = AuctionEvent::Outbid {
            auction_id: 3,
            item_name: "Helm".to_string(),
            user_id: "x".to_string(),
            new_amount: 220,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "outbid");
        assert_eq!(json["new_amount"], 220);
        assert_eq!(event.kind(), "outbid");
    }
}
