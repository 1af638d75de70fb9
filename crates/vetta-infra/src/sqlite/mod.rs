//! SQLite persistence (durable mode).

pub mod checkpoint;
pub mod pool;
pub mod session;

pub use checkpoint::SqliteCheckpointStore;
pub use pool::DatabasePool;
pub use session::SqliteInterviewRepository;
