// region:    --- Imports
use dkp_auction::catalog::StaticCatalog;
use dkp_auction::clock::SystemClock;
use dkp_auction::config::Config;
use dkp_auction::controller::{AuctionController, EngineSettings};
use dkp_auction::database::DatabaseManager;
use dkp_auction::handlers::{self, AppState};
use dkp_auction::message_broker::KafkaManager;
use dkp_auction::notify::{KafkaNotifier, Notifier, TracingNotifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(&config.database_url).await?);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 아이템 카탈로그
    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => {
            let catalog = StaticCatalog::load(path)?;
            info!("{:<12} --> 카탈로그 로드: {}", "Main", path.display());
            catalog
        }
        None => {
            warn!("{:<12} --> CATALOG_PATH 없음, 빈 카탈로그 사용", "Main");
            StaticCatalog::new()
        }
    });

    // 알림: 브로커가 있으면 Kafka, 없으면 로그
    let notifier: Arc<dyn Notifier> = match &config.kafka_brokers {
        Some(brokers) => {
            let kafka_manager = KafkaManager::new(brokers.as_str());
            if let Err(e) = kafka_manager
                .ensure_topic(&config.notification_topic, 5, 1)
                .await
            {
                warn!("{:<12} --> 토픽 생성 실패 (계속 진행): {}", "Main", e);
            }
            let producer = kafka_manager.producer_for(&config.notification_topic)?;
            info!("{:<12} --> Kafka 초기화 성공", "Main");
            Arc::new(KafkaNotifier::new(producer))
        }
        None => {
            info!("{:<12} --> KAFKA_BROKERS 없음, 로그 알림 사용", "Main");
            Arc::new(TracingNotifier)
        }
    };

    let controller = Arc::new(AuctionController::new(
        Arc::clone(&db_manager),
        catalog.clone(),
        catalog,
        notifier,
        Arc::new(SystemClock),
        EngineSettings::from(&config),
    ));

    // 재시작 복구
    let report = controller.recover_on_startup().await?;
    info!("{:<12} --> 재시작 복구: {:?}", "Main", report);

    // 라우터 설정
    let routes_all = handlers::router(AppState {
        controller: Arc::clone(&controller),
    });

    // 리스너 생성
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    controller.shutdown();
    Ok(())
}
// endregion: --- Main
