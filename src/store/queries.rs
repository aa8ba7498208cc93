/// 경매 컬럼 목록
const AUCTION_COLUMNS: &str = "id, guild_id, game_id, item_id, item_name, category_name, quantity, minimum_dkp, minimum_currency, bid_increment, starting_price, start_ts, end_ts, status, closed_at, thread_ref, announcement_ref";

/// 경매 생성
pub const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (guild_id, game_id, item_id, item_name, category_name, quantity, minimum_dkp, minimum_currency, bid_increment, starting_price, start_ts, end_ts, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'open')
    RETURNING id
"#;

/// 경매 조회
pub fn get_auction() -> String {
    format!(
        "SELECT {} FROM auctions WHERE id = $1 AND guild_id = $2 AND game_id = $3",
        AUCTION_COLUMNS
    )
}

/// 스레드로 진행 중 경매 조회
pub fn find_open_by_thread() -> String {
    format!(
        "SELECT {} FROM auctions WHERE thread_ref = $1 AND guild_id = $2 AND game_id = $3 AND status = 'open'",
        AUCTION_COLUMNS
    )
}

/// 범위 내 진행 중 경매 조회
pub fn find_open() -> String {
    format!(
        "SELECT {} FROM auctions WHERE guild_id = $1 AND game_id = $2 AND status = 'open' ORDER BY end_ts ASC, id ASC",
        AUCTION_COLUMNS
    )
}

/// 재시작 복구 대상 조회 (진행 중이거나 외부 핸들이 남아 있는 경매)
pub fn recovery_candidates() -> String {
    format!(
        "SELECT {} FROM auctions WHERE status = 'open' OR thread_ref IS NOT NULL OR announcement_ref IS NOT NULL ORDER BY end_ts ASC, id ASC",
        AUCTION_COLUMNS
    )
}

/// 수량/마감 수정 (진행 중인 경매만)
pub const UPDATE_QUANTITY_AND_DEADLINE: &str = r#"
    UPDATE auctions
    SET quantity = COALESCE($1, quantity),
        starting_price = COALESCE($1, quantity) * minimum_currency,
        end_ts = COALESCE($2, end_ts)
    WHERE id = $3 AND guild_id = $4 AND game_id = $5 AND status = 'open'
"#;

/// 종료 처리 (진행 중일 때만 적용)
pub const MARK_CLOSED: &str = r#"
    UPDATE auctions
    SET status = 'closed', closed_at = $1, end_ts = $1
    WHERE id = $2 AND guild_id = $3 AND game_id = $4 AND status = 'open'
"#;

/// 외부 핸들 연결
pub const SET_REFERENCES: &str = r#"
    UPDATE auctions
    SET thread_ref = $1, announcement_ref = $2
    WHERE id = $3 AND guild_id = $4 AND game_id = $5
"#;

/// 진행 중인 경매 삭제
pub const DELETE_OPEN_AUCTION: &str =
    "DELETE FROM auctions WHERE id = $1 AND guild_id = $2 AND game_id = $3 AND status = 'open'";

/// 경매 입찰 삭제
pub const DELETE_BIDS: &str = "DELETE FROM bids WHERE auction_id = $1";

/// 입찰 기록
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, placed_at)
    VALUES ($1, $2, $3, $4)
    RETURNING id
"#;

/// 입찰 목록 (입찰 시각 순)
pub const GET_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, amount, placed_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY placed_at ASC, id ASC
"#;

/// 최고 입찰 (같은 금액이면 먼저 들어온 입찰)
pub const GET_HIGHEST_BID: &str = r#"
    SELECT id, auction_id, bidder_id, amount, placed_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC, placed_at ASC, id ASC
    LIMIT 1
"#;

/// 범위 내 진행 중 경매와 현재 선두 입찰자
pub const OPEN_AUCTION_LEADERS: &str = r#"
    SELECT a.id, a.quantity, a.minimum_dkp,
        (SELECT b.bidder_id FROM bids b
         WHERE b.auction_id = a.id
         ORDER BY b.amount DESC, b.placed_at ASC, b.id ASC
         LIMIT 1) AS leader
    FROM auctions a
    WHERE a.guild_id = $1 AND a.game_id = $2 AND a.status = 'open'
"#;

/// 경매 이력 기록
pub const INSERT_HISTORY: &str = r#"
    INSERT INTO auction_history (auction_id, winner_id, winning_amount, item_name, category_name, quantity, closed_at, bids)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

/// 기간 내 경매 이력 (최신순)
pub const GET_HISTORY_SINCE: &str = r#"
    SELECT h.auction_id, h.winner_id, h.winning_amount, h.item_name, h.category_name, h.quantity, h.closed_at, h.bids
    FROM auction_history h
    JOIN auctions a ON a.id = h.auction_id
    WHERE a.guild_id = $1 AND a.game_id = $2 AND h.closed_at >= $3
    ORDER BY h.closed_at DESC, h.auction_id DESC
"#;

/// 포인트 계정 생성 (없을 때만)
pub const ENSURE_ACCOUNT: &str = r#"
    INSERT INTO ledger_accounts (guild_id, game_id, user_id, balance)
    VALUES ($1, $2, $3, 0)
    ON CONFLICT (guild_id, game_id, user_id) DO NOTHING
"#;

/// 포인트 잔액 조회
pub const GET_BALANCE: &str =
    "SELECT balance FROM ledger_accounts WHERE guild_id = $1 AND game_id = $2 AND user_id = $3";

/// 포인트 잔액 갱신
pub const UPDATE_BALANCE: &str =
    "UPDATE ledger_accounts SET balance = $1 WHERE guild_id = $2 AND game_id = $3 AND user_id = $4";

/// 포인트 거래 기록
pub const INSERT_TRANSACTION: &str = r#"
    INSERT INTO ledger_transactions (guild_id, game_id, user_id, kind, amount, balance_after, description, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

/// 포인트 거래 내역 (최신순)
pub const GET_TRANSACTIONS: &str = r#"
    SELECT id, user_id, kind, amount, balance_after, description, created_at
    FROM ledger_transactions
    WHERE guild_id = $1 AND game_id = $2 AND user_id = $3
    ORDER BY created_at DESC, id DESC
    LIMIT $4
"#;
