//! Database module: models, schema and the snapshot store.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows, plus the write models the
//!   reconciliation engine produces
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: the `SnapshotStore` trait the sync pipeline depends on
//! - `sqlite.rs`: the SQLite implementation

pub mod models;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use models::{
    DbConnection, DbDailySnapshot, DbVideo, NewConnection, ReachSource, RefreshedToken,
    SnapshotUpsert, VideoUpsert,
};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, SqliteStore};
pub use store::SnapshotStore;
