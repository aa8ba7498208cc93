/// 경매 마감 스케줄러
/// 경매마다 종료(close) 타이머와 정리(cleanup) 타이머를 둔다.
/// 타이머는 경매 id + 종류로만 식별되며, 원본은 항상 저장된 마감 시각이다.
/// 재시작 시 `recover_on_startup` 이 저장된 마감 시각으로 타이머를 다시 만든다.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionId, Scope};
use crate::clock::Clock;
use crate::error::{AuctionError, AuctionResult};
use crate::notify::{release_best_effort, Notifier};
use crate::settlement::{CloseOutcome, SettlementEngine};
use crate::store::AuctionStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Timer Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Close,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub auction_id: AuctionId,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn close(auction_id: AuctionId) -> Self {
        Self {
            auction_id,
            kind: TimerKind::Close,
        }
    }

    pub fn cleanup(auction_id: AuctionId) -> Self {
        Self {
            auction_id,
            kind: TimerKind::Cleanup,
        }
    }
}

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// 재시작 복구 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub rearmed: usize,
    pub settled: usize,
    pub cleaned: usize,
    pub cleanup_rearmed: usize,
    pub failed: usize,
}
// endregion: --- Timer Identity

// region:    --- Auction Scheduler
pub struct AuctionScheduler {
    store: Arc<AuctionStore>,
    engine: Arc<SettlementEngine>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cleanup_grace: Duration,
    timers: Mutex<HashMap<TimerKey, TimerEntry>>,
    generation: AtomicU64,
}

impl AuctionScheduler {
    pub fn new(
        store: Arc<AuctionStore>,
        engine: Arc<SettlementEngine>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        cleanup_grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            engine,
            notifier,
            clock,
            cleanup_grace,
            timers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// 종료/정리 타이머 등록. 기존 타이머는 교체된다.
    pub fn schedule(self: &Arc<Self>, auction: &Auction) {
        self.cancel(auction.id);
        let scope = auction.scope();
        self.arm(scope.clone(), TimerKey::close(auction.id), auction.end_time);
        self.arm(
            scope,
            TimerKey::cleanup(auction.id),
            auction.cleanup_deadline(self.cleanup_grace),
        );
        info!(
            "{:<12} --> 경매 타이머 등록 id: {}, 마감: {}",
            "Scheduler", auction.id, auction.end_time
        );
    }

    /// 두 타이머 모두 취소. 이미 실행됐거나 없는 타이머는 무시한다.
    pub fn cancel(&self, auction_id: AuctionId) {
        let mut timers = self.timers();
        for key in [TimerKey::close(auction_id), TimerKey::cleanup(auction_id)] {
            if let Some(entry) = timers.remove(&key) {
                entry.handle.abort();
                debug!("{:<12} --> 타이머 취소: {:?}", "Scheduler", key);
            }
        }
    }

    pub fn is_close_scheduled(&self, auction_id: AuctionId) -> bool {
        self.is_scheduled(TimerKey::close(auction_id))
    }

    pub fn is_cleanup_scheduled(&self, auction_id: AuctionId) -> bool {
        self.is_scheduled(TimerKey::cleanup(auction_id))
    }

    fn is_scheduled(&self, key: TimerKey) -> bool {
        self.timers()
            .get(&key)
            .map(|entry| !entry.handle.is_finished())
            .unwrap_or(false)
    }

    /// 대기 중인 타이머 수
    pub fn pending_timers(&self) -> usize {
        self.timers().len()
    }

    /// 모든 타이머 중단
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
        info!("{:<12} --> 스케줄러 종료", "Scheduler");
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<TimerKey, TimerEntry>> {
        match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 마감 시각에 실행될 타이머 생성
    fn arm(self: &Arc<Self>, scope: Scope, key: TimerKey, deadline: DateTime<Utc>) {
        let delay = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        // 등록이 끝날 때까지 맵을 잡고 있어야 바로 실행되는 타이머도 자기 항목을 찾는다
        let mut timers = self.timers();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(scope, key, generation).await;
        });
        if let Some(previous) = timers.insert(key, TimerEntry { generation, handle }) {
            previous.handle.abort();
        }
        drop(timers);
        debug!(
            "{:<12} --> 타이머 등록: {:?}, {}ms 후",
            "Scheduler",
            key,
            delay.as_millis()
        );
    }

    async fn fire(self: Arc<Self>, scope: Scope, key: TimerKey, generation: u64) {
        // 맵에서 먼저 빠져야 이후 cancel 이 실행 중인 정산을 중단하지 않는다
        let current = {
            let mut timers = self.timers();
            match timers.get(&key) {
                Some(entry) if entry.generation == generation => {
                    timers.remove(&key);
                    true
                }
                _ => false,
            }
        };
        if !current {
            return;
        }

        match key.kind {
            TimerKind::Close => {
                info!("{:<12} --> 자동 종료 실행 id: {}", "Scheduler", key.auction_id);
                // 실패해도 종료 타이머는 다시 등록하지 않는다 (수동 종료로 재시도)
                match self.settle(&scope, key.auction_id).await {
                    Ok(_) => {}
                    Err(AuctionError::NotFound(_)) => {
                        info!(
                            "{:<12} --> 취소된 경매 id: {}",
                            "Scheduler", key.auction_id
                        );
                    }
                    Err(e) => {
                        error!(
                            "{:<12} --> 자동 종료 실패 id: {}, {}",
                            "Scheduler", key.auction_id, e
                        );
                    }
                }
            }
            TimerKind::Cleanup => {
                if let Err(e) = self.run_cleanup(&scope, key.auction_id).await {
                    error!(
                        "{:<12} --> 정리 실패 id: {}, {}",
                        "Scheduler", key.auction_id, e
                    );
                }
            }
        }
    }

    /// 정산 후 정리 타이머가 없으면 등록한다
    pub async fn settle(self: &Arc<Self>, scope: &Scope, id: AuctionId) -> AuctionResult<CloseOutcome> {
        let outcome = self.engine.close(scope, id).await?;
        let auction = match &outcome {
            CloseOutcome::Settled(settlement) => &settlement.auction,
            CloseOutcome::AlreadyClosed(auction) => auction,
        };
        self.ensure_cleanup(auction).await;
        Ok(outcome)
    }

    async fn ensure_cleanup(self: &Arc<Self>, auction: &Auction) {
        if self.is_cleanup_scheduled(auction.id) {
            return;
        }
        let scope = auction.scope();
        let deadline = auction.cleanup_deadline(self.cleanup_grace);
        if deadline <= self.clock.now() {
            if let Err(e) = self.run_cleanup(&scope, auction.id).await {
                error!("{:<12} --> 정리 실패 id: {}, {}", "Scheduler", auction.id, e);
            }
        } else {
            self.arm(scope, TimerKey::cleanup(auction.id), deadline);
        }
    }

    /// 외부 핸들 정리
    pub async fn run_cleanup(&self, scope: &Scope, id: AuctionId) -> AuctionResult<()> {
        let Some(auction) = self.store.get(scope, id).await? else {
            debug!("{:<12} --> 정리 대상 없음 id: {}", "Scheduler", id);
            return Ok(());
        };
        let refs = auction.references();
        if refs.is_empty() {
            return Ok(());
        }

        release_best_effort(self.notifier.as_ref(), scope, &refs).await;
        self.store.clear_references(scope, id).await?;
        info!("{:<12} --> 외부 핸들 정리 완료 id: {}", "Scheduler", id);
        Ok(())
    }

    /// 재시작 복구
    /// - 진행 중 + 마감 전: 타이머 재등록
    /// - 진행 중 + 마감 지남: 즉시 정산
    /// - 종료 + 정리 시각 지남: 즉시 정리
    /// - 종료 + 정리 시각 전: 정리 타이머 재등록
    pub async fn recover_on_startup(self: &Arc<Self>) -> AuctionResult<RecoveryReport> {
        let now = self.clock.now();
        let mut report = RecoveryReport::default();

        for auction in self.store.recovery_candidates().await? {
            let scope = auction.scope();
            if auction.is_open() {
                if auction.end_time > now {
                    self.schedule(&auction);
                    report.rearmed += 1;
                    continue;
                }
                match self.settle(&scope, auction.id).await {
                    Ok(_) => report.settled += 1,
                    Err(e) => {
                        warn!(
                            "{:<12} --> 복구 중 정산 실패 id: {}, {}",
                            "Scheduler", auction.id, e
                        );
                        report.failed += 1;
                    }
                }
                continue;
            }

            let deadline = auction.cleanup_deadline(self.cleanup_grace);
            if deadline <= now {
                match self.run_cleanup(&scope, auction.id).await {
                    Ok(()) => report.cleaned += 1,
                    Err(e) => {
                        warn!(
                            "{:<12} --> 복구 중 정리 실패 id: {}, {}",
                            "Scheduler", auction.id, e
                        );
                        report.failed += 1;
                    }
                }
            } else {
                self.arm(scope, TimerKey::cleanup(auction.id), deadline);
                report.cleanup_rearmed += 1;
            }
        }

        info!("{:<12} --> 재시작 복구 완료: {:?}", "Scheduler", report);
        Ok(report)
    }
}
// endregion: --- Auction Scheduler
