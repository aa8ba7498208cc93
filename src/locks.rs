//! 길드/게임 범위별 직렬화 잠금
//!
//! 입찰, 정산, 수정, 취소는 같은 범위 안에서 한 번에 하나씩 실행된다.
//! 잔액 검증이 항상 마지막으로 커밋된 입찰과 정산을 보게 하기 위함이다.

use crate::auction::model::Scope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct ScopeLocks {
    locks: Mutex<HashMap<Scope, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, scope: &Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(scope.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_scope_serializes() {
        let locks = Arc::new(ScopeLocks::new());
        let scope = Scope::new("g", "x");

        let guard = locks.lock(&scope).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let scope = scope.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&scope).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_scope_does_not_block() {
        let locks = ScopeLocks::new();
        let _guard = locks.lock(&Scope::new("g", "x")).await;
        let _other = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock(&Scope::new("g", "y")),
        )
        .await
        .unwrap();
    }
}
