// SQLite-backed storage for automod configs and violation history.

pub mod sqlite_config_store;
pub mod sqlite_violation_store;

pub use sqlite_config_store::SqliteAutomodConfigStore;
pub use sqlite_violation_store::SqliteViolationStore;
