mod pg_store;
mod pool;

pub use pg_store::PgStore;
pub use pool::Database;
