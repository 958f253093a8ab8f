use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// In-flight DNS-01 challenge record served by the traffic routers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "dnschallenges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub fqdn: String,
    pub record: String,
    pub xml_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
