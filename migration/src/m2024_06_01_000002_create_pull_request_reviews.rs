//! Migration to create the pull_request_reviews table.
//!
//! Reviews are keyed by the upstream review id and reference their owning
//! pull request. Pending reviews have no submission time, so `submitted_at`
//! is nullable.

use sea_orm_migration::prelude::*;

use crate::m2024_06_01_000001_create_pull_requests::PullRequests;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PullRequestReviews::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PullRequestReviews::ReviewId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PullRequestReviews::PrId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PullRequestReviews::Repo).text().not_null())
                    .col(
                        ColumnDef::new(PullRequestReviews::Username)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PullRequestReviews::State).text().not_null())
                    .col(
                        ColumnDef::new(PullRequestReviews::SubmittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PullRequestReviews::CommitId).text().null())
                    .col(
                        ColumnDef::new(PullRequestReviews::Data)
                            .json_binary()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_request_reviews_pr_id")
                            .from(PullRequestReviews::Table, PullRequestReviews::PrId)
                            .to(PullRequests::Table, PullRequests::PrId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pull_request_reviews_pr_id")
                    .table(PullRequestReviews::Table)
                    .col(PullRequestReviews::PrId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_pull_request_reviews_pr_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PullRequestReviews::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PullRequestReviews {
    Table,
    ReviewId,
    PrId,
    Repo,
    Username,
    State,
    SubmittedAt,
    CommitId,
    Data,
}
