//! Keepsake database layer
//!
//! Repositories for the `photos` table plus pool setup and migrations.

pub mod db;
pub mod setup;

pub use db::{InMemoryPhotoRepository, PgPhotoRepository, PhotoRepository};
pub use setup::setup_database;
