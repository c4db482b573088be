//! SQLite implementation of [`stride_common::Store`].

pub mod sqlite;

pub use sqlite::SqliteStore;
