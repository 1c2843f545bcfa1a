//! Data ingestion and storage
//!
//! Parsers for replay dumps and provider snapshots, and SQLite database
//! management.

pub mod database;
pub mod ingest;

pub use database::Database;
