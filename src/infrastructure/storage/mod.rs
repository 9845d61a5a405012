pub mod connection_pool;
pub mod sqlite_sink;

pub use connection_pool::ConnectionPool;
pub use sqlite_sink::SqliteStorageSink;
