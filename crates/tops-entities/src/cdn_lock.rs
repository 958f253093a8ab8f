use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use tops_core::UtcDateTime;

/// A lock a user holds on a CDN. Hard locks block every other user from
/// changing the CDN's delivery services.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "cdn_lock")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cdn: String,
    pub username: String,
    pub message: Option<String>,
    pub soft: bool,
    pub created_at: UtcDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
