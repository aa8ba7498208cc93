// region:    --- Imports
use crate::auction::model::{AuctionId, ExternalRefs, Scope};
use crate::bidding::model::PlaceBidCommand;
use crate::controller::{AuctionController, EditAuction, EndOutcome, StartAuction};
use crate::error::AuctionError;
use crate::ledger::PointAdjustment;
use crate::settlement::CloseOutcome;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

const DEFAULT_HISTORY_SECS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_TRANSACTION_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AuctionController>,
}

// region:    --- Router
pub fn router(state: AppState) -> Router {
    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/guilds/:guild/games/:game/auctions",
            post(handle_start_auction).get(handle_open_auctions),
        )
        .route(
            "/guilds/:guild/games/:game/auctions/:id",
            get(handle_get_auction)
                .patch(handle_edit_auction)
                .delete(handle_cancel_auction),
        )
        .route(
            "/guilds/:guild/games/:game/auctions/:id/bids",
            post(handle_place_bid),
        )
        .route(
            "/guilds/:guild/games/:game/auctions/:id/end",
            post(handle_end_auction),
        )
        .route(
            "/guilds/:guild/games/:game/auctions/:id/thread",
            put(handle_attach_references),
        )
        .route(
            "/guilds/:guild/games/:game/threads/:thread",
            get(handle_find_by_thread),
        )
        .route("/guilds/:guild/games/:game/history", get(handle_history))
        .route(
            "/guilds/:guild/games/:game/points",
            post(handle_grant_points),
        )
        .route(
            "/guilds/:guild/games/:game/points/:user",
            get(handle_get_points),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
// endregion: --- Router

// region:    --- Error Response
impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BidTooLow { .. } | Self::InsufficientFunds { .. } | Self::AuctionClosed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Settlement(_) | Self::Database(_) | Self::Serialization(_) => {
                error!("{:<12} --> 서버 에러: {}", "Handler", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match &self {
            Self::BidTooLow { minimum, offered } => {
                body["minimum"] = json!(minimum);
                body["offered"] = json!(offered);
            }
            Self::InsufficientFunds { balance, required } => {
                body["balance"] = json!(balance);
                body["required"] = json!(required);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
// endregion: --- Error Response

// region:    --- Request Bodies
fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub item_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub duration_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub quantity: Option<i64>,
    pub duration_delta_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub bidder_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub since_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PointsRequest {
    pub adjustments: Vec<PointAdjustment>,
}
// endregion: --- Request Bodies

// region:    --- Auction Handlers
/// 요청의 초 단위 값을 Duration 으로 변환
fn seconds(secs: i64) -> Result<Duration, AuctionError> {
    Duration::try_seconds(secs)
        .ok_or_else(|| AuctionError::InvalidInput(format!("시간 값이 범위를 벗어났습니다: {}", secs)))
}

type ScopePath = Path<(String, String)>;
type AuctionPath = Path<(String, String, AuctionId)>;

/// 경매 시작
pub async fn handle_start_auction(
    State(state): State<AppState>,
    Path((guild, game)): ScopePath,
    Json(req): Json<StartRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> 경매 시작 요청: {:?}", "Handler", req);
    let started = state
        .controller
        .start(StartAuction {
            scope: Scope::new(guild, game),
            item_id: req.item_id,
            quantity: req.quantity,
            duration: req.duration_secs.map(seconds).transpose()?,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// 진행 중 경매 목록
pub async fn handle_open_auctions(
    State(state): State<AppState>,
    Path((guild, game)): ScopePath,
) -> Result<impl IntoResponse, AuctionError> {
    let auctions = state
        .controller
        .open_auctions(&Scope::new(guild, game))
        .await?;
    Ok(Json(auctions))
}

/// 경매 상세 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> 경매 조회 id: {}", "Handler", id);
    let snapshot = state
        .controller
        .snapshot(&Scope::new(guild, game), id)
        .await?;
    Ok(Json(snapshot))
}

/// 경매 수정
pub async fn handle_edit_auction(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
    Json(req): Json<EditRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> 경매 수정 요청 id: {}, {:?}", "Handler", id, req);
    let auction = state
        .controller
        .edit(
            &Scope::new(guild, game),
            id,
            EditAuction {
                quantity: req.quantity,
                duration_delta: req.duration_delta_secs.map(seconds).transpose()?,
            },
        )
        .await?;
    Ok(Json(auction))
}

/// 경매 취소
pub async fn handle_cancel_auction(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> 경매 취소 요청 id: {}", "Handler", id);
    state
        .controller
        .cancel(&Scope::new(guild, game), id)
        .await?;
    Ok(Json(json!({ "status": "cancelled", "auction_id": id })))
}

/// 입찰
pub async fn handle_place_bid(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
    Json(req): Json<BidRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> 입찰 요청 id: {}, {:?}", "Handler", id, req);
    let receipt = state
        .controller
        .place_bid(
            &Scope::new(guild, game),
            PlaceBidCommand {
                auction_id: id,
                bidder_id: req.bidder_id,
                amount: req.amount,
            },
        )
        .await?;
    Ok(Json(receipt))
}

/// 수동 종료
pub async fn handle_end_auction(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
    Json(req): Json<EndRequest>,
) -> Result<Response, AuctionError> {
    info!("{:<12} --> 경매 종료 요청 id: {}, {:?}", "Handler", id, req);
    let outcome = state
        .controller
        .end(&Scope::new(guild, game), id, req.confirmed)
        .await?;

    let response = match outcome {
        EndOutcome::ConfirmationRequired(auction) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "confirmation_required", "auction": auction })),
        )
            .into_response(),
        EndOutcome::Closed(CloseOutcome::AlreadyClosed(auction)) => {
            Json(json!({ "status": "already_closed", "auction": auction })).into_response()
        }
        EndOutcome::Closed(CloseOutcome::Settled(settlement)) => Json(json!({
            "status": "settled",
            "record": settlement.record,
            "charge": settlement.charge,
            "cost": settlement.cost,
        }))
        .into_response(),
    };
    Ok(response)
}

/// 외부 핸들 연결
pub async fn handle_attach_references(
    State(state): State<AppState>,
    Path((guild, game, id)): AuctionPath,
    Json(refs): Json<ExternalRefs>,
) -> Result<impl IntoResponse, AuctionError> {
    let auction = state
        .controller
        .attach_references(&Scope::new(guild, game), id, refs)
        .await?;
    Ok(Json(auction))
}

/// 스레드로 진행 중 경매 찾기
pub async fn handle_find_by_thread(
    State(state): State<AppState>,
    Path((guild, game, thread)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AuctionError> {
    let auction = state
        .controller
        .find_open_by_thread(&Scope::new(guild, game), &thread)
        .await?;
    Ok(Json(auction))
}

/// 경매 이력
pub async fn handle_history(
    State(state): State<AppState>,
    Path((guild, game)): ScopePath,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AuctionError> {
    let since_secs = query.since_secs.unwrap_or(DEFAULT_HISTORY_SECS);
    if since_secs < 0 {
        return Err(AuctionError::InvalidInput(
            "since_secs 는 0 이상이어야 합니다.".to_string(),
        ));
    }
    let records = state
        .controller
        .history(&Scope::new(guild, game), seconds(since_secs)?)
        .await?;
    Ok(Json(records))
}
// endregion: --- Auction Handlers

// region:    --- Point Handlers
/// 포인트 조회
pub async fn handle_get_points(
    State(state): State<AppState>,
    Path((guild, game, user)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, AuctionError> {
    let scope = Scope::new(guild, game);
    let balance = state.controller.balance(&scope, &user).await?;
    let at_risk = state.controller.risk_for_user(&scope, &user).await?;
    let transactions = state
        .controller
        .transactions(&scope, &user, DEFAULT_TRANSACTION_LIMIT)
        .await?;
    Ok(Json(json!({
        "user_id": user,
        "balance": balance,
        "at_risk": at_risk,
        "transactions": transactions,
    })))
}

/// 일괄 포인트 조정
pub async fn handle_grant_points(
    State(state): State<AppState>,
    Path((guild, game)): ScopePath,
    Json(req): Json<PointsRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!(
        "{:<12} --> 포인트 조정 요청: {}건",
        "Handler",
        req.adjustments.len()
    );
    let changes = state
        .controller
        .grant_points(&Scope::new(guild, game), req.adjustments)
        .await?;
    Ok(Json(changes))
}
// endregion: --- Point Handlers
