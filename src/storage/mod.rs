//! Storage layer for surfacemap
//!
//! Provides the pooled SQLite database and the consolidated asset repository

pub mod assets;
pub mod database;

pub use assets::{AssetCounts, AssetDraft, AssetStore, ClearStats};
pub use database::{Database, DbConn, DbPool, DbStats};
