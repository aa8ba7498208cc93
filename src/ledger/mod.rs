/// DKP 원장
/// 사용자별 포인트 잔액과 추가 전용 거래 내역을 관리한다.
/// 잔액 변경과 거래 기록은 하나의 트랜잭션으로 처리되며, 차감은 0 에서 멈춘다.
// region:    --- Imports
use crate::auction::model::Scope;
use crate::cache::CacheAside;
use crate::clock::{from_millis, to_millis, Clock};
use crate::database::DatabaseManager;
use crate::error::AuctionResult;
use crate::locks::ScopeLocks;
use crate::store::queries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

/// 원장 거래 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub user_id: String,
    pub kind: TransactionKind,
    /// 요청된 금액 (절대값)
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// 일괄 포인트 조정 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointAdjustment {
    pub user_id: String,
    pub delta: i64,
    pub description: String,
}

/// 잔액 변경 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub user_id: String,
    pub old_balance: i64,
    pub new_balance: i64,
}

type AccountKey = (Scope, String);
// endregion: --- Models

// region:    --- Ledger
/// 잔액 캐시는 범위 잠금 안에서만 채우고 비운다.
/// 입찰 검증이 커밋 직전의 잔액을 캐시에서 읽는 일이 없다.
pub struct Ledger {
    db: Arc<DatabaseManager>,
    locks: Arc<ScopeLocks>,
    clock: Arc<dyn Clock>,
    balances: CacheAside<AccountKey, i64>,
}

impl Ledger {
    pub fn new(db: Arc<DatabaseManager>, locks: Arc<ScopeLocks>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            locks,
            clock,
            balances: CacheAside::new(),
        }
    }

    /// 잔액 조회 (계정이 없으면 0)
    pub async fn balance(&self, scope: &Scope, user_id: &str) -> AuctionResult<i64> {
        let _guard = self.locks.lock(scope).await;
        let mut conn = self.db.pool().acquire().await?;
        self.balance_in(&mut conn, scope, user_id).await
    }

    /// 주어진 커넥션에서 잔액 조회 (캐시 어사이드)
    /// 호출자가 범위 잠금을 잡고 있어야 한다.
    pub(crate) async fn balance_in(
        &self,
        conn: &mut SqliteConnection,
        scope: &Scope,
        user_id: &str,
    ) -> AuctionResult<i64> {
        let key = (scope.clone(), user_id.to_string());
        if let Some(balance) = self.balances.get(&key) {
            return Ok(balance);
        }
        let balance = read_balance(conn, scope, user_id).await?;
        self.balances.put(key, balance);
        Ok(balance)
    }

    /// 잔액 조정. 차감이 잔액을 넘으면 0 으로 맞추고 실패하지 않는다.
    pub async fn adjust(
        &self,
        scope: &Scope,
        user_id: &str,
        delta: i64,
        description: &str,
    ) -> AuctionResult<i64> {
        let guard = self.locks.lock(scope).await;
        let now = self.clock.now();
        let mut tx = self.db.pool().begin().await?;
        let change = adjust_in(&mut tx, scope, user_id, delta, description, now).await?;
        tx.commit().await?;
        self.invalidate(scope, user_id);
        drop(guard);

        info!(
            "{:<12} --> 포인트 조정: scope={}, user={}, {} -> {}",
            "Ledger", scope, user_id, change.old_balance, change.new_balance
        );
        Ok(change.new_balance)
    }

    /// 일괄 포인트 조정 (이벤트 보상 등). 전부 적용되거나 전부 취소된다.
    pub async fn adjust_many(
        &self,
        scope: &Scope,
        adjustments: Vec<PointAdjustment>,
    ) -> AuctionResult<Vec<BalanceChange>> {
        let guard = self.locks.lock(scope).await;
        let now = self.clock.now();
        let users: Vec<String> = adjustments.iter().map(|a| a.user_id.clone()).collect();
        let tx_scope = scope.clone();

        let changes = self
            .db
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut changes = Vec::with_capacity(adjustments.len());
                    for adjustment in adjustments {
                        let change = adjust_in(
                            &mut **tx,
                            &tx_scope,
                            &adjustment.user_id,
                            adjustment.delta,
                            &adjustment.description,
                            now,
                        )
                        .await?;
                        changes.push(change);
                    }
                    Ok::<_, crate::error::AuctionError>(changes)
                })
            })
            .await?;

        for user_id in &users {
            self.invalidate(scope, user_id);
        }
        drop(guard);
        info!(
            "{:<12} --> 일괄 포인트 조정: scope={}, {}건",
            "Ledger",
            scope,
            changes.len()
        );
        Ok(changes)
    }

    /// 거래 내역 (최신순)
    pub async fn transactions(
        &self,
        scope: &Scope,
        user_id: &str,
        limit: i64,
    ) -> AuctionResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query(queries::GET_TRANSACTIONS)
            .bind(&scope.guild_id)
            .bind(&scope.game_id)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter()
            .map(|row| -> AuctionResult<LedgerTransaction> {
                let kind: String = row.try_get("kind")?;
                Ok(LedgerTransaction {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    kind: if kind == "debit" {
                        TransactionKind::Debit
                    } else {
                        TransactionKind::Credit
                    },
                    amount: row.try_get("amount")?,
                    balance_after: row.try_get("balance_after")?,
                    description: row.try_get("description")?,
                    created_at: from_millis(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    /// 커밋 후 캐시 무효화 (범위 잠금 안에서 호출)
    pub(crate) fn invalidate(&self, scope: &Scope, user_id: &str) {
        self.balances
            .invalidate(&(scope.clone(), user_id.to_string()));
    }
}
// endregion: --- Ledger

// region:    --- Connection Helpers
async fn read_balance(
    conn: &mut SqliteConnection,
    scope: &Scope,
    user_id: &str,
) -> AuctionResult<i64> {
    let balance = sqlx::query_scalar::<_, i64>(queries::GET_BALANCE)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(balance.unwrap_or(0))
}

/// 트랜잭션 안에서 잔액을 조정하고 거래를 기록한다.
/// 호출자는 커밋 후 `Ledger::invalidate` 를 호출해야 한다.
pub(crate) async fn adjust_in(
    conn: &mut SqliteConnection,
    scope: &Scope,
    user_id: &str,
    delta: i64,
    description: &str,
    at: DateTime<Utc>,
) -> AuctionResult<BalanceChange> {
    sqlx::query(queries::ENSURE_ACCOUNT)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let old_balance = read_balance(conn, scope, user_id).await?;
    let new_balance = clamped_balance(old_balance, delta);

    sqlx::query(queries::UPDATE_BALANCE)
        .bind(new_balance)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let kind = if delta < 0 {
        TransactionKind::Debit
    } else {
        TransactionKind::Credit
    };
    sqlx::query(queries::INSERT_TRANSACTION)
        .bind(&scope.guild_id)
        .bind(&scope.game_id)
        .bind(user_id)
        .bind(kind.as_str())
        .bind(delta.saturating_abs())
        .bind(new_balance)
        .bind(description)
        .bind(to_millis(at))
        .execute(&mut *conn)
        .await?;

    Ok(BalanceChange {
        user_id: user_id.to_string(),
        old_balance,
        new_balance,
    })
}

/// 0 아래로 내려가지 않는 잔액 계산
fn clamped_balance(balance: i64, delta: i64) -> i64 {
    balance.saturating_add(delta).max(0)
}
// endregion: --- Connection Helpers
