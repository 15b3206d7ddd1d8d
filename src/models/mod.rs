//! # Data Models
//!
//! SeaORM entities for the tables the syncer writes.

pub mod pull_request;
pub mod review;
pub mod sync_checkpoint;

pub use pull_request::Entity as PullRequest;
pub use review::Entity as Review;
pub use sync_checkpoint::Entity as SyncCheckpoint;
