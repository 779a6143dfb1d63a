pub mod connection;
pub mod diff;
pub mod error;
pub mod export;
pub mod name_cache;
pub mod process;
pub mod resolver;
pub mod source;
pub mod table;
pub mod worker_pool;

#[cfg(test)]
pub mod testing;
