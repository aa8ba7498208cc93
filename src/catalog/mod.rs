/// 아이템/카테고리 조회와 게임별 기본 설정 협력자
// region:    --- Imports
use crate::auction::model::Scope;
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Models
/// 아이템 카테고리 가격 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub minimum_dkp: i64,
    pub minimum_currency: i64,
    pub bid_increment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub category: Category,
}

/// 게임별 기본값
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDefaults {
    pub auction_duration: Duration,
    pub currency_name: String,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            auction_duration: Duration::hours(24),
            currency_name: "Gold".to_string(),
        }
    }
}
// endregion: --- Models

// region:    --- Collaborator Traits
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn get_item(&self, scope: &Scope, item_id: &str) -> Option<CatalogItem>;
}

#[async_trait]
pub trait GameSettings: Send + Sync {
    async fn defaults(&self, scope: &Scope) -> GameDefaults;
}
// endregion: --- Collaborator Traits

// region:    --- Static Catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("카탈로그 파일을 읽을 수 없습니다: {0}")]
    Io(#[from] std::io::Error),

    #[error("카탈로그 형식이 올바르지 않습니다: {0}")]
    Parse(#[from] serde_json::Error),
}

/// JSON 카탈로그 문서
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub games: Vec<GameEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameEntry {
    pub guild_id: String,
    pub game_id: String,
    #[serde(default = "default_currency")]
    pub currency_name: String,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: i64,
    #[serde(default)]
    pub items: Vec<CatalogItem>,
}

fn default_currency() -> String {
    GameDefaults::default().currency_name
}

fn default_duration_secs() -> i64 {
    GameDefaults::default().auction_duration.num_seconds()
}

/// 메모리에 올린 카탈로그
#[derive(Debug, Default)]
pub struct StaticCatalog {
    games: HashMap<Scope, (GameDefaults, HashMap<String, CatalogItem>)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: CatalogDocument) -> Self {
        let mut catalog = Self::new();
        for game in document.games {
            let scope = Scope::new(game.guild_id, game.game_id);
            catalog.set_defaults(
                &scope,
                GameDefaults {
                    // 표현할 수 없는 값은 0 으로 두어 경매 시작에서 거절된다
                    auction_duration: Duration::try_seconds(game.default_duration_secs)
                        .unwrap_or_else(Duration::zero),
                    currency_name: game.currency_name,
                },
            );
            for item in game.items {
                catalog.insert_item(&scope, item);
            }
        }
        catalog
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(document))
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    pub fn set_defaults(&mut self, scope: &Scope, defaults: GameDefaults) {
        self.games
            .entry(scope.clone())
            .or_insert_with(|| (GameDefaults::default(), HashMap::new()))
            .0 = defaults;
    }

    pub fn insert_item(&mut self, scope: &Scope, item: CatalogItem) {
        self.games
            .entry(scope.clone())
            .or_insert_with(|| (GameDefaults::default(), HashMap::new()))
            .1
            .insert(item.id.clone(), item);
    }
}

#[async_trait]
impl ItemCatalog for StaticCatalog {
    async fn get_item(&self, scope: &Scope, item_id: &str) -> Option<CatalogItem> {
        self.games
            .get(scope)
            .and_then(|(_, items)| items.get(item_id))
            .cloned()
    }
}

#[async_trait]
impl GameSettings for StaticCatalog {
    async fn defaults(&self, scope: &Scope) -> GameDefaults {
        self.games
            .get(scope)
            .map(|(defaults, _)| defaults.clone())
            .unwrap_or_default()
    }
}
// endregion: --- Static Catalog
