use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use tops_core::UtcDateTime;

pub const LATEST_VERSION: &str = "latest";

/// One stored SSL key bundle. `version` holds the numeric version as text or
/// the `latest` alias, which always mirrors the highest written version.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sslkey")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub deliveryservice: String,
    pub cdn: String,
    pub version: String,
    pub data: Json,
    pub last_updated: UtcDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        self.last_updated = Set(chrono::Utc::now());
        Ok(self)
    }
}
