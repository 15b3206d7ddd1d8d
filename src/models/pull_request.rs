//! Pull request entity model
//!
//! Wide table keyed by the upstream pull request id. Rows are always
//! written whole, after enrichment has filled the derived columns.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pull_requests")]
pub struct Model {
    /// Upstream pull request id (primary key, not generated locally)
    #[sea_orm(primary_key, auto_increment = false)]
    pub pr_id: i64,

    pub repo_id: i64,

    /// Repository full name, `owner/name`
    pub repo: String,

    pub number: i64,

    /// Author login
    pub username: String,

    pub title: String,

    pub body: Option<String>,

    /// `open` or `closed`
    pub state: String,

    pub draft: bool,

    /// Lines added across all changed files
    pub additions: i64,

    /// Lines deleted across all changed files
    pub deletions: i64,

    pub changed_files: i64,

    pub merged_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    /// Most recent `ready_for_review` transition, if any
    pub last_ready_for_review_at: Option<DateTimeWithTimeZone>,

    /// Raw upstream payload
    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
