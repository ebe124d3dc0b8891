//! `rusqlite`-backed implementation of [`cloche_common::PersistenceStore`]
//! (spec §4.6, §6.5).

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;
