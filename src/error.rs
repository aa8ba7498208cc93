// region:    --- Imports
use crate::auction::model::AuctionId;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Auction Error
/// 경매 엔진 에러
#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("찾을 수 없습니다: {0}")]
    NotFound(String),

    #[error("이미 진행 중인 경매가 있습니다: {0}")]
    Conflict(String),

    #[error("입찰 금액이 최소 입찰가보다 낮습니다. 최소: {minimum}, 입찰: {offered}")]
    BidTooLow { minimum: i64, offered: i64 },

    #[error("DKP 가 부족합니다. 보유: {balance}, 필요: {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("경매가 이미 종료되었습니다: {0}")]
    AuctionClosed(AuctionId),

    #[error("잘못된 요청입니다: {0}")]
    InvalidInput(String),

    #[error("경매 정산 실패: {0}")]
    Settlement(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AuctionError {
    /// 응답에 사용하는 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::BidTooLow { .. } => "LOW_BID",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::AuctionClosed(_) => "ALREADY_ENDED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Settlement(_) => "SETTLEMENT_FAILED",
            Self::Database(_) => "DATABASE",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }
}

pub type AuctionResult<T> = Result<T, AuctionError>;
// endregion: --- Auction Error

// region:    --- Notify Error
/// 알림 협력자 에러. 코어 밖으로 전파되지 않는다.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("알림 직렬화 실패: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("알림 전송 실패: {0}")]
    Delivery(String),
}
// endregion: --- Notify Error

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AuctionError::BidTooLow {
                minimum: 200,
                offered: 150
            }
            .code(),
            "LOW_BID"
        );
        assert_eq!(AuctionError::AuctionClosed(7).code(), "ALREADY_ENDED");
        assert_eq!(
            AuctionError::InsufficientFunds {
                balance: 25,
                required: 30
            }
            .to_string(),
            "DKP 가 부족합니다. 보유: 25, 필요: 30"
        );
    }
}
