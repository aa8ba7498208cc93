/// 알림 토픽용 Kafka 연결
/// 길드/게임 범위를 키로 삼아 같은 범위의 알림이 한 파티션에서 순서대로 나가게 한다.
// region:    --- Imports
use crate::auction::model::Scope;
use crate::error::NotifyError;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

// endregion: --- Imports

const MESSAGE_TIMEOUT_MS: &str = "5000";
const QUEUE_TIMEOUT: Duration = Duration::from_millis(500);

fn client_config(brokers: &str) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", brokers);
    config
}

// region:    --- Notification Producer
/// 하나의 알림 토픽에 묶인 프로듀서
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
    topic: String,
}

impl KafkaProducer {
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, NotifyError> {
        let producer: FutureProducer = client_config(brokers)
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
            .create()
            .map_err(|e| NotifyError::Delivery(format!("프로듀서 생성 실패: {:?}", e)))?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
            topic: topic.into(),
        })
    }

    /// 범위 키로 알림 본문 전송
    pub async fn publish(&self, scope: &Scope, body: &str) -> Result<(), NotifyError> {
        let key = scope.to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(body);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(QUEUE_TIMEOUT))
            .await
            .map_err(|(e, _)| NotifyError::Delivery(format!("알림 전송 실패: {:?}", e)))?;

        debug!(
            "{:<12} --> 알림 전송: topic={}, key={}, partition={}, offset={}",
            "Producer", self.topic, key, partition, offset
        );
        Ok(())
    }
}
// endregion: --- Notification Producer

// region:    --- Kafka Manager
pub struct KafkaManager {
    brokers: String,
}

impl KafkaManager {
    pub fn new(brokers: impl Into<String>) -> Self {
        KafkaManager {
            brokers: brokers.into(),
        }
    }

    /// 알림 토픽용 프로듀서 생성
    pub fn producer_for(&self, topic: &str) -> Result<Arc<KafkaProducer>, NotifyError> {
        Ok(Arc::new(KafkaProducer::new(&self.brokers, topic)?))
    }

    /// 토픽 생성. 이미 있으면 성공으로 본다.
    pub async fn ensure_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), NotifyError> {
        info!("{:<12} --> Kafka 토픽 확인: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = client_config(&self.brokers)
            .create()
            .map_err(|e| NotifyError::Delivery(format!("AdminClient 생성 실패: {:?}", e)))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );
        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| NotifyError::Delivery(format!("토픽 생성 요청 실패: {:?}", e)))?;

        for result in results {
            match result {
                Ok(name) => info!("{:<12} --> Kafka 토픽 생성: {}", "Manager", name),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("{:<12} --> Kafka 토픽 이미 존재: {}", "Manager", name)
                }
                Err((name, code)) => {
                    error!("{:<12} --> Kafka 토픽 생성 실패: {}, {:?}", "Manager", name, code);
                    return Err(NotifyError::Delivery(format!(
                        "토픽 생성 실패: {} ({:?})",
                        name, code
                    )));
                }
            }
        }
        Ok(())
    }
}
// endregion: --- Kafka Manager
