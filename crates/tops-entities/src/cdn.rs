use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "cdn")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub domain_name: String,
    pub dnssec_enabled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::deliveryservice::Entity")]
    DeliveryServices,
}

impl Related<super::deliveryservice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryServices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
