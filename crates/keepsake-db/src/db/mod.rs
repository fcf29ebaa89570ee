//! Database repositories for the data access layer
//!
//! `PhotoRepository` is the seam the failover engine persists through. The Postgres
//! implementation backs production; the in-memory one serves local runs without a
//! database and tests.

pub mod memory;
pub mod photo;

pub use memory::InMemoryPhotoRepository;
pub use photo::{PgPhotoRepository, PhotoRepository};
