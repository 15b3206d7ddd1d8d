//! Sync checkpoint entity model
//!
//! One row per repository in the `sync_status` table.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_status")]
pub struct Model {
    /// Repository full name, `owner/name`
    #[sea_orm(primary_key, auto_increment = false)]
    pub repo: String,

    /// Latest `updated_at` known to be persisted; `None` = never synced
    pub last_synced: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
