//! Domain models

pub mod health;
pub mod photo;

pub use health::HealthState;
pub use photo::{NewPhoto, Photo};
