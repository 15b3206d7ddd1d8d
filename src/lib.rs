//! # Pull Request Syncer Library
//!
//! Incrementally mirrors GitHub pull requests, their reviews and diff
//! statistics into a relational store, sharing a pool of rate-limited API
//! tokens across every request.

pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod sync;
pub mod telemetry;
pub use migration;
