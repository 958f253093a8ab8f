use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "deliveryservice")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub xml_id: String,
    pub cdn_id: i32,
    /// Version of the SSL key bundle last written to the vault. Zero means none.
    pub ssl_key_version: i32,
    pub example_url: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cdn::Entity",
        from = "Column::CdnId",
        to = "super::cdn::Column::Id"
    )]
    Cdn,
}

impl Related<super::cdn::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cdn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
