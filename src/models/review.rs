//! Review entity model
//!
//! Reviews belong to a pull request and are keyed by the upstream review id.

use super::pull_request::Entity as PullRequest;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pull_request_reviews")]
pub struct Model {
    /// Upstream review id (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub review_id: i64,

    /// Owning pull request
    pub pr_id: i64,

    pub repo: String,

    /// Reviewer login
    pub username: String,

    /// APPROVED, CHANGES_REQUESTED, COMMENTED, DISMISSED or PENDING
    pub state: String,

    /// `None` while the review is pending
    pub submitted_at: Option<DateTimeWithTimeZone>,

    pub commit_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub data: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "PullRequest",
        from = "Column::PrId",
        to = "super::pull_request::Column::PrId",
        on_delete = "Cascade"
    )]
    PullRequest,
}

impl Related<PullRequest> for Entity {
    fn to() -> RelationDef {
        Relation::PullRequest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
