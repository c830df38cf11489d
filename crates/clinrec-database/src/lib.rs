//! # clinrec-database
//!
//! Persistence for recommendation jobs: the [`JobStore`] trait the queue
//! accessor is written against, a PostgreSQL implementation, an in-memory
//! implementation, and connection pool management.

pub mod connection;
pub mod error;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryJobStore;
pub use repositories::JobRepository;
pub use store::JobStore;
