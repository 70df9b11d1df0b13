pub mod models;
pub mod sqlite_store;
pub mod writer;

pub use sqlite_store::SqliteStore;
pub use writer::NotificationWriter;
