use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One namespaced key/value record of the device-local store.
///
/// Keys are logical resource names (`progress:<item_id>`, `bookmarks`);
/// values are JSON payloads. The payload is opaque at this layer.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "local_record")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    #[sea_orm(column_type = "Text")]
    pub value: String,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
