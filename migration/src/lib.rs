//! Database migrations for the pull request syncer.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2024_06_01_000001_create_pull_requests;
mod m2024_06_01_000002_create_pull_request_reviews;
mod m2024_06_01_000003_create_sync_status;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2024_06_01_000001_create_pull_requests::Migration),
            Box::new(m2024_06_01_000002_create_pull_request_reviews::Migration),
            Box::new(m2024_06_01_000003_create_sync_status::Migration),
        ]
    }
}
