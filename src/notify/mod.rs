/// 알림 협력자
/// 코어는 이벤트를 던지기만 하고, 전송 실패는 기록만 한 뒤 무시한다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{ExternalRefs, Scope};
use crate::error::NotifyError;
use crate::message_broker::KafkaProducer;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Notifier Trait
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 이벤트 공지 (started, outbid, won, log, history)
    async fn announce(&self, scope: &Scope, event: &AuctionEvent) -> Result<(), NotifyError>;

    /// 경매 종료 후 외부 핸들(스레드, 공지) 정리
    async fn release(&self, scope: &Scope, refs: &ExternalRefs) -> Result<(), NotifyError>;
}

/// 실패를 삼키는 공지. 정산과 입찰은 알림 때문에 실패하지 않는다.
pub async fn announce_best_effort(notifier: &dyn Notifier, scope: &Scope, event: &AuctionEvent) {
    if let Err(e) = notifier.announce(scope, event).await {
        warn!(
            "{:<12} --> 알림 전송 실패 (무시): kind={}, {}",
            "Notifier",
            event.kind(),
            e
        );
    }
}

pub async fn release_best_effort(notifier: &dyn Notifier, scope: &Scope, refs: &ExternalRefs) {
    if refs.is_empty() {
        return;
    }
    if let Err(e) = notifier.release(scope, refs).await {
        warn!("{:<12} --> 핸들 정리 실패 (무시): {}", "Notifier", e);
    }
}
// endregion: --- Notifier Trait

// region:    --- Kafka Notifier
/// 카프카 토픽으로 보내는 알림 봉투
#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    guild_id: &'a str,
    game_id: &'a str,
    kind: &'a str,
    payload: &'a T,
}

pub struct KafkaNotifier {
    producer: Arc<KafkaProducer>,
}

impl KafkaNotifier {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }

    async fn publish<T: Serialize + Sync>(
        &self,
        scope: &Scope,
        kind: &str,
        payload: &T,
    ) -> Result<(), NotifyError> {
        let envelope = Envelope {
            guild_id: &scope.guild_id,
            game_id: &scope.game_id,
            kind,
            payload,
        };
        let body = serde_json::to_string(&envelope)?;
        self.producer.publish(scope, &body).await
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn announce(&self, scope: &Scope, event: &AuctionEvent) -> Result<(), NotifyError> {
        self.publish(scope, event.kind(), event).await
    }

    async fn release(&self, scope: &Scope, refs: &ExternalRefs) -> Result<(), NotifyError> {
        self.publish(scope, "cleanup", refs).await
    }
}
// endregion: --- Kafka Notifier

// region:    --- Tracing Notifier
/// 브로커가 없을 때 로그로만 남기는 알림
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn announce(&self, scope: &Scope, event: &AuctionEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_string(event)?;
        info!(
            "{:<12} --> [{}] {}: {}",
            "Notifier",
            scope,
            event.kind(),
            body
        );
        Ok(())
    }

    async fn release(&self, scope: &Scope, refs: &ExternalRefs) -> Result<(), NotifyError> {
        info!("{:<12} --> [{}] cleanup: {:?}", "Notifier", scope, refs);
        Ok(())
    }
}
// endregion: --- Tracing Notifier

// region:    --- Memory Notifier
/// 보낸 알림을 메모리에 쌓아 두는 알림 (임베딩/테스트용)
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<(Scope, AuctionEvent)>>,
    released: Mutex<Vec<(Scope, ExternalRefs)>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 모든 전송을 실패시킨다
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn events(&self) -> Vec<AuctionEvent> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    pub fn events_of(&self, kind: &str) -> Vec<AuctionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn released(&self) -> Vec<ExternalRefs> {
        self.released
            .lock()
            .map(|released| released.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    fn is_failing(&self) -> bool {
        self.failing.lock().map(|flag| *flag).unwrap_or(false)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn announce(&self, scope: &Scope, event: &AuctionEvent) -> Result<(), NotifyError> {
        if self.is_failing() {
            return Err(NotifyError::Delivery("memory notifier offline".to_string()));
        }
        if let Ok(mut events) = self.events.lock() {
            events.push((scope.clone(), event.clone()));
        }
        Ok(())
    }

    async fn release(&self, scope: &Scope, refs: &ExternalRefs) -> Result<(), NotifyError> {
        if self.is_failing() {
            return Err(NotifyError::Delivery("memory notifier offline".to_string()));
        }
        if let Ok(mut released) = self.released.lock() {
            released.push((scope.clone(), refs.clone()));
        }
        Ok(())
    }
}
// endregion: --- Memory Notifier
